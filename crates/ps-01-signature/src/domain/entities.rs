//! # Domain Entities
//!
//! Keys, nonces and signatures for the single-signer and multi-party schemes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use k256::elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{hex::Hex, serde_as};
use shared_types::{Address, Hash, PartyKey};
use zeroize::Zeroizing;

use super::curve::{
    address_from_point, decode_point, encode_point, is_below_half_order, scalar_from_bytes,
    scalar_to_bytes, x_and_parity,
};
use super::errors::SignatureError;

// =============================================================================
// KEYS
// =============================================================================

/// A secp256k1 keypair usable for single-signer Schnorr.
///
/// The public key always satisfies the half-order rule.
#[derive(Clone)]
pub struct KeyPair {
    secret: Zeroizing<[u8; 32]>,
    public: ProjectivePoint,
    party_key: PartyKey,
}

impl KeyPair {
    /// Sample a fresh keypair, retrying until `Px < (n/2)+1`.
    pub fn generate() -> Self {
        loop {
            let secret = Scalar::random(&mut OsRng);
            if let Ok(pair) = Self::from_scalar(secret) {
                return pair;
            }
        }
    }

    /// Load a keypair from big-endian secret bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidPrivateKey` if the scalar is zero or not below n
    /// - `HalfOrderViolation` if the public key cannot sign single-signer messages
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        let secret = scalar_from_bytes(bytes).map_err(|_| SignatureError::InvalidPrivateKey)?;
        Self::from_scalar(secret)
    }

    /// Load a keypair from a (optionally `0x`-prefixed) hex string.
    pub fn from_hex(text: &str) -> Result<Self, SignatureError> {
        let stripped = text.trim().strip_prefix("0x").unwrap_or(text.trim());
        let bytes = Zeroizing::new(
            hex::decode(stripped).map_err(|_| SignatureError::InvalidPrivateKey)?,
        );
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SignatureError::InvalidPrivateKey)?;
        Self::from_secret_bytes(&array)
    }

    fn from_scalar(secret: Scalar) -> Result<Self, SignatureError> {
        if bool::from(secret.is_zero()) {
            return Err(SignatureError::InvalidPrivateKey);
        }
        let public = ProjectivePoint::GENERATOR * secret;
        let (x, _) = x_and_parity(&public);
        if !is_below_half_order(&x) {
            return Err(SignatureError::HalfOrderViolation);
        }
        Ok(Self {
            secret: Zeroizing::new(scalar_to_bytes(&secret)),
            public,
            party_key: encode_point(&public)?,
        })
    }

    /// Compressed public key.
    #[must_use]
    pub fn party_key(&self) -> PartyKey {
        self.party_key
    }

    /// Public key as a curve point.
    #[must_use]
    pub fn public_point(&self) -> ProjectivePoint {
        self.public
    }

    /// Ethereum address of the public key.
    #[must_use]
    pub fn address(&self) -> Address {
        address_from_point(&self.public).unwrap_or_default()
    }

    pub(crate) fn secret_scalar(&self) -> Scalar {
        // Stored bytes came from a valid scalar.
        scalar_from_bytes(&self.secret).unwrap_or(Scalar::ZERO)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.party_key)
            .finish_non_exhaustive()
    }
}

/// Result of MuSig-style key aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateKey {
    pub(crate) point: ProjectivePoint,
    pub(crate) party_key: PartyKey,
    pub(crate) seed: Hash,
    pub(crate) coefficients: BTreeMap<PartyKey, Scalar>,
}

impl AggregateKey {
    /// Aggregate public key `X = Σ a_i·P_i`.
    #[must_use]
    pub fn point(&self) -> ProjectivePoint {
        self.point
    }

    /// Compressed encoding of the aggregate key.
    #[must_use]
    pub fn party_key(&self) -> PartyKey {
        self.party_key
    }

    /// `L = H(sorted keys)`, the seed every coefficient is derived from.
    #[must_use]
    pub fn seed(&self) -> Hash {
        self.seed
    }

    /// Coefficient `a_i` of a participating key.
    #[must_use]
    pub fn coefficient(&self, key: &PartyKey) -> Option<Scalar> {
        self.coefficients.get(key).copied()
    }

    /// Participating keys in canonical (sorted) order.
    pub fn signers(&self) -> impl Iterator<Item = &PartyKey> {
        self.coefficients.keys()
    }
}

// =============================================================================
// NONCES
// =============================================================================

/// The public half of a signer's nonce set, shared with the other signers.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicNonces {
    #[serde_as(as = "Hex")]
    pub session_id: Hash,
    pub points: Vec<PartyKey>,
}

/// Secret nonces for one signing session.
///
/// Consumed by exactly one `partial_sign`; the secrets are wiped afterwards.
pub struct NonceSet {
    session_id: Hash,
    secrets: Zeroizing<Vec<[u8; 32]>>,
    public: PublicNonces,
    consumed: bool,
}

impl NonceSet {
    /// Draw `count` fresh nonces bound to `session_id`.
    pub fn generate(session_id: Hash, count: usize) -> Result<Self, SignatureError> {
        if count == 0 {
            return Err(SignatureError::EmptyNonceSet);
        }
        let mut secrets = Zeroizing::new(Vec::with_capacity(count));
        let mut points = Vec::with_capacity(count);
        while secrets.len() < count {
            let k = Scalar::random(&mut OsRng);
            if bool::from(k.is_zero()) {
                continue;
            }
            points.push(encode_point(&(ProjectivePoint::GENERATOR * k))?);
            secrets.push(scalar_to_bytes(&k));
        }
        Ok(Self {
            session_id,
            secrets,
            public: PublicNonces { session_id, points },
            consumed: false,
        })
    }

    /// Public nonces to broadcast.
    #[must_use]
    pub fn public_nonces(&self) -> &PublicNonces {
        &self.public
    }

    /// Signing session this set was drawn for.
    #[must_use]
    pub fn session_id(&self) -> Hash {
        self.session_id
    }

    /// Whether the set has already produced a partial signature.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Hand out the secret scalars once and wipe them.
    pub(crate) fn take_secrets(&mut self, session_id: &Hash) -> Result<Vec<Scalar>, SignatureError> {
        if self.consumed {
            return Err(SignatureError::NonceReused);
        }
        if &self.session_id != session_id {
            return Err(SignatureError::NonceSessionMismatch);
        }
        let scalars = self
            .secrets
            .iter()
            .map(scalar_from_bytes)
            .collect::<Result<Vec<_>, _>>()?;
        self.secrets.clear();
        self.consumed = true;
        Ok(scalars)
    }
}

impl fmt::Debug for NonceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonceSet")
            .field("session_id", &hex::encode(self.session_id))
            .field("count", &self.public.points.len())
            .field("consumed", &self.consumed)
            .finish()
    }
}

/// Combined nonce `R` for one message plus the binding coefficient `b`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateNonce {
    pub(crate) session_id: Hash,
    pub(crate) point: ProjectivePoint,
    pub(crate) binding: Scalar,
}

impl AggregateNonce {
    /// Combined nonce point `R`.
    #[must_use]
    pub fn point(&self) -> ProjectivePoint {
        self.point
    }

    /// Binding coefficient `b = H(all nonces ‖ msg)`.
    #[must_use]
    pub fn binding(&self) -> Scalar {
        self.binding
    }

    /// Signing session the nonces were drawn for.
    #[must_use]
    pub fn session_id(&self) -> Hash {
        self.session_id
    }
}

// =============================================================================
// SIGNATURES
// =============================================================================

/// Single-signer Schnorr signature: `s` plus the address of `k·G`.
///
/// Hex form is `0x ‖ s (32 bytes) ‖ nonce address (20 bytes)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchnorrSignature {
    pub s: [u8; 32],
    pub nonce_address: Address,
}

impl SchnorrSignature {
    /// Encoded length in bytes.
    pub const LEN: usize = 52;

    /// `0x`-prefixed hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut bytes = [0u8; Self::LEN];
        bytes[..32].copy_from_slice(&self.s);
        bytes[32..].copy_from_slice(&self.nonce_address);
        format!("0x{}", hex::encode(bytes))
    }
}

impl fmt::Display for SchnorrSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for SchnorrSignature {
    type Err = SignatureError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let stripped = text.strip_prefix("0x").unwrap_or(text);
        let bytes =
            hex::decode(stripped).map_err(|_| SignatureError::InvalidEncoding(text.to_string()))?;
        if bytes.len() != Self::LEN {
            return Err(SignatureError::InvalidEncoding(text.to_string()));
        }
        let mut s = [0u8; 32];
        let mut nonce_address = [0u8; 20];
        s.copy_from_slice(&bytes[..32]);
        nonce_address.copy_from_slice(&bytes[32..]);
        Ok(Self { s, nonce_address })
    }
}

impl Serialize for SchnorrSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SchnorrSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// One signer's contribution: its weighted nonce `R_j`, `s_j` and the shared `e`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSignature {
    pub signer: PartyKey,
    pub r: ProjectivePoint,
    pub s: Scalar,
    pub e: Scalar,
}

/// Combined multi-party signature `{R, s, e}` in wire form.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiSignature {
    pub r: PartyKey,
    #[serde_as(as = "Hex")]
    pub s: [u8; 32],
    #[serde_as(as = "Hex")]
    pub e: [u8; 32],
}

impl MultiSignature {
    pub(crate) fn from_parts(
        r: &ProjectivePoint,
        s: &Scalar,
        e: &Scalar,
    ) -> Result<Self, SignatureError> {
        Ok(Self {
            r: encode_point(r)?,
            s: scalar_to_bytes(s),
            e: scalar_to_bytes(e),
        })
    }

    /// Decode into `(R, s, e)`.
    pub fn to_parts(&self) -> Result<(ProjectivePoint, Scalar, Scalar), SignatureError> {
        Ok((
            decode_point(&self.r)?,
            scalar_from_bytes(&self.s)?,
            scalar_from_bytes(&self.e)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_respect_half_order() {
        for _ in 0..16 {
            let pair = KeyPair::generate();
            let (x, _) = x_and_parity(&pair.public_point());
            assert!(is_below_half_order(&x));
        }
    }

    #[test]
    fn test_from_secret_bytes_rejects_zero() {
        assert_eq!(
            KeyPair::from_secret_bytes(&[0u8; 32]).unwrap_err(),
            SignatureError::InvalidPrivateKey
        );
        assert_eq!(
            KeyPair::from_secret_bytes(&[0xFF; 32]).unwrap_err(),
            SignatureError::InvalidPrivateKey
        );
    }

    #[test]
    fn test_from_hex_matches_bytes() {
        let pair = KeyPair::generate();
        let hex_secret = format!("0x{}", hex::encode(*pair.secret));
        let loaded = KeyPair::from_hex(&hex_secret).unwrap();
        assert_eq!(loaded.party_key(), pair.party_key());
    }

    #[test]
    fn test_debug_hides_secret() {
        let pair = KeyPair::generate();
        let text = format!("{pair:?}");
        assert!(!text.contains(&hex::encode(*pair.secret)));
    }

    #[test]
    fn test_signature_hex_round_trip() {
        let sig = SchnorrSignature {
            s: [0xAB; 32],
            nonce_address: [0x12; 20],
        };
        let text = sig.to_hex();
        assert_eq!(text.len(), 2 + SchnorrSignature::LEN * 2);
        assert_eq!(text.parse::<SchnorrSignature>().unwrap(), sig);
        assert!("0x1234".parse::<SchnorrSignature>().is_err());
    }

    #[test]
    fn test_nonce_set_single_use() {
        let session = [7u8; 32];
        let mut nonces = NonceSet::generate(session, 2).unwrap();
        assert_eq!(nonces.public_nonces().points.len(), 2);
        assert_eq!(nonces.take_secrets(&session).unwrap().len(), 2);
        assert!(nonces.is_consumed());
        assert_eq!(
            nonces.take_secrets(&session).unwrap_err(),
            SignatureError::NonceReused
        );
    }

    #[test]
    fn test_nonce_set_session_binding() {
        let mut nonces = NonceSet::generate([1u8; 32], 1).unwrap();
        assert_eq!(
            nonces.take_secrets(&[2u8; 32]).unwrap_err(),
            SignatureError::NonceSessionMismatch
        );
        assert!(!nonces.is_consumed());
    }

    #[test]
    fn test_nonce_set_requires_count() {
        assert_eq!(
            NonceSet::generate([0u8; 32], 0).unwrap_err(),
            SignatureError::EmptyNonceSet
        );
    }
}
