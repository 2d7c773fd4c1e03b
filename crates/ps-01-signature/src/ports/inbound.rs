//! # Inbound Ports (Driving Ports / API)
//!
//! The session engine signs every outbound message and verifies every inbound
//! trailer through these traits, so a key held elsewhere (HSM, remote signer)
//! can stand in for an in-process `KeyPair`.

use shared_types::{Hash, PartyKey};

use crate::domain::entities::{KeyPair, SchnorrSignature};
use crate::domain::errors::SignatureError;
use crate::domain::schnorr::{sign_digest, verify_digest};

/// Produces single-signer signatures for one identity.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait MessageSigner: Send + Sync {
    /// Identity the signatures verify against.
    fn party_key(&self) -> PartyKey;

    /// Sign a 32-byte digest.
    fn sign(&self, digest: &Hash) -> SchnorrSignature;
}

impl MessageSigner for KeyPair {
    fn party_key(&self) -> PartyKey {
        KeyPair::party_key(self)
    }

    fn sign(&self, digest: &Hash) -> SchnorrSignature {
        sign_digest(digest, self)
    }
}

/// Stateless single-signer verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchnorrVerifier;

impl SchnorrVerifier {
    /// Create a new verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Verify `signature` over `digest` for `signer`.
    pub fn verify(
        &self,
        digest: &Hash,
        signature: &SchnorrSignature,
        signer: &PartyKey,
    ) -> Result<(), SignatureError> {
        verify_digest(digest, signature, signer)
    }

    /// Parse a hex signature and verify it.
    pub fn verify_hex(
        &self,
        digest: &Hash,
        signature: &str,
        signer: &PartyKey,
    ) -> Result<(), SignatureError> {
        let signature: SchnorrSignature = signature.parse()?;
        self.verify(digest, &signature, signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::curve::keccak256;

    #[test]
    fn test_keypair_as_signer() {
        let pair = KeyPair::generate();
        let signer: &dyn MessageSigner = &pair;
        let digest = keccak256(b"heartbeat");
        let sig = signer.sign(&digest);
        let verifier = SchnorrVerifier::new();
        assert!(verifier.verify(&digest, &sig, &signer.party_key()).is_ok());
        assert!(verifier
            .verify_hex(&digest, &sig.to_hex(), &signer.party_key())
            .is_ok());
    }

    #[test]
    fn test_verify_hex_rejects_garbage() {
        let pair = KeyPair::generate();
        assert!(matches!(
            SchnorrVerifier::new().verify_hex(&[0u8; 32], "0xzz", &pair.party_key()),
            Err(SignatureError::InvalidEncoding(_))
        ));
    }
}
