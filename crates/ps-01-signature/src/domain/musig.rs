//! # Multi-Party Schnorr
//!
//! n-of-n signatures that verify against one aggregate key:
//!
//! ```text
//! L   = H(P_1 ‖ … ‖ P_n)          keys sorted
//! a_i = H(L ‖ P_i)
//! X   = Σ a_i·P_i
//! b   = H(all public nonces ‖ msgHash)
//! R_j = Σ_i b^i·R_{j,i}           per signer
//! R   = Σ R_j
//! e   = H(Xx ‖ parity ‖ msgHash ‖ address(R))
//! s_j = Σ_i b^i·k_{j,i} + e·a_j·x_j
//! ok  ⇔ (Σ s_j)·G == R + e·X
//! ```
//!
//! Nonce groups must be aggregated in the same order by every signer;
//! `SigningSession` fixes that order to the sorted signer keys.

use std::collections::{BTreeMap, BTreeSet};

use k256::{ProjectivePoint, Scalar};
use shared_types::{Hash, PartyKey};
use tracing::debug;

use super::curve::{address_from_point, decode_point, encode_point, hash_to_scalar, keccak256, scalar_pow};
use super::entities::{
    AggregateKey, AggregateNonce, KeyPair, MultiSignature, NonceSet, PartialSignature,
    PublicNonces,
};
use super::errors::SignatureError;
use super::nonce_registry::ConsumedNonceRegistry;
use super::schnorr::challenge;

// =============================================================================
// AGGREGATION
// =============================================================================

/// Aggregate public keys. Order-independent; duplicates collapse.
pub fn aggregate_keys(keys: &[PartyKey]) -> Result<AggregateKey, SignatureError> {
    let sorted: BTreeSet<PartyKey> = keys.iter().copied().collect();
    if sorted.is_empty() {
        return Err(SignatureError::EmptyKeySet);
    }

    let concat: Vec<u8> = sorted
        .iter()
        .flat_map(|key| key.as_bytes().iter().copied())
        .collect();
    let seed = keccak256(&concat);

    let mut point = ProjectivePoint::IDENTITY;
    let mut coefficients = BTreeMap::new();
    for key in &sorted {
        let public = decode_point(key)?;
        let mut preimage = Vec::with_capacity(32 + key.as_bytes().len());
        preimage.extend_from_slice(&seed);
        preimage.extend_from_slice(key.as_bytes());
        let coefficient = hash_to_scalar(&preimage);
        point += public * coefficient;
        coefficients.insert(*key, coefficient);
    }

    if point == ProjectivePoint::IDENTITY {
        return Err(SignatureError::DegenerateAggregate);
    }

    Ok(AggregateKey {
        point,
        party_key: encode_point(&point)?,
        seed,
        coefficients,
    })
}

/// Combine every signer's public nonces into `R` for `message_hash`.
pub fn aggregate_nonces(
    groups: &[PublicNonces],
    message_hash: &Hash,
) -> Result<AggregateNonce, SignatureError> {
    let first = groups.first().ok_or(SignatureError::EmptyNonceSet)?;
    let session_id = first.session_id;

    let mut transcript = Vec::new();
    for group in groups {
        if group.session_id != session_id {
            return Err(SignatureError::NonceSessionMismatch);
        }
        if group.points.is_empty() {
            return Err(SignatureError::EmptyNonceSet);
        }
        for point in &group.points {
            transcript.extend_from_slice(point.as_bytes());
        }
    }
    transcript.extend_from_slice(message_hash);
    let binding = hash_to_scalar(&transcript);

    let mut point = ProjectivePoint::IDENTITY;
    for group in groups {
        point += weighted_nonce(group, &binding)?;
    }
    if point == ProjectivePoint::IDENTITY {
        return Err(SignatureError::DegenerateAggregate);
    }

    Ok(AggregateNonce {
        session_id,
        point,
        binding,
    })
}

/// `R_j = Σ_i b^i·R_{j,i}`.
fn weighted_nonce(group: &PublicNonces, binding: &Scalar) -> Result<ProjectivePoint, SignatureError> {
    let mut acc = ProjectivePoint::IDENTITY;
    for (i, encoded) in group.points.iter().enumerate() {
        acc += decode_point(encoded)? * scalar_pow(binding, i);
    }
    Ok(acc)
}

/// Challenge for an aggregate key and nonce.
pub fn multi_challenge(
    aggregate_key: &AggregateKey,
    aggregate_nonce: &AggregateNonce,
    message_hash: &Hash,
) -> Result<Scalar, SignatureError> {
    let nonce_address =
        address_from_point(&aggregate_nonce.point).ok_or(SignatureError::DegenerateAggregate)?;
    Ok(challenge(&aggregate_key.point, message_hash, &nonce_address))
}

// =============================================================================
// SIGNING
// =============================================================================

/// Produce one signer's partial signature and consume its nonce set.
///
/// # Errors
///
/// - `NonceReused` if `nonces` already signed
/// - `NonceSessionMismatch` if `nonces` were drawn for another session
/// - `UnknownSigner` if `key` is not part of `aggregate_key`
pub fn partial_sign(
    nonces: &mut NonceSet,
    aggregate_nonce: &AggregateNonce,
    aggregate_key: &AggregateKey,
    key: &KeyPair,
    challenge: &Scalar,
) -> Result<PartialSignature, SignatureError> {
    let signer = key.party_key();
    let coefficient = aggregate_key
        .coefficient(&signer)
        .ok_or_else(|| SignatureError::UnknownSigner(signer.to_string()))?;

    let secrets = nonces.take_secrets(&aggregate_nonce.session_id)?;
    let mut effective = Scalar::ZERO;
    for (i, k) in secrets.iter().enumerate() {
        effective += k * &scalar_pow(&aggregate_nonce.binding, i);
    }

    let s = effective + challenge * &coefficient * &key.secret_scalar();
    Ok(PartialSignature {
        signer,
        r: ProjectivePoint::GENERATOR * effective,
        s,
        e: *challenge,
    })
}

/// Sum partial signatures into the combined `{R, s, e}`.
///
/// # Errors
///
/// - `EmptyPartialSet` for no input
/// - `ChallengeMismatch` if the partials disagree on `e`
pub fn combine(partials: &[PartialSignature]) -> Result<MultiSignature, SignatureError> {
    let first = partials.first().ok_or(SignatureError::EmptyPartialSet)?;
    let e = first.e;

    let mut r = ProjectivePoint::IDENTITY;
    let mut s = Scalar::ZERO;
    for partial in partials {
        if partial.e != e {
            return Err(SignatureError::ChallengeMismatch);
        }
        r += partial.r;
        s += partial.s;
    }
    MultiSignature::from_parts(&r, &s, &e)
}

// =============================================================================
// VERIFICATION
// =============================================================================

/// `s·G == R + e·X`.
#[must_use]
pub fn verify(
    aggregate_nonce: &ProjectivePoint,
    s: &Scalar,
    challenge: &Scalar,
    aggregate_key: &ProjectivePoint,
) -> bool {
    ProjectivePoint::GENERATOR * s == *aggregate_nonce + *aggregate_key * challenge
}

impl MultiSignature {
    /// Verify against an encoded aggregate key and message digest.
    ///
    /// Also checks that `e` is the challenge for this key, message and `R`,
    /// so a signature cannot be replayed onto a different message.
    pub fn verify(&self, aggregate_key: &PartyKey, message_hash: &Hash) -> Result<(), SignatureError> {
        let (r, s, e) = self.to_parts()?;
        let x = decode_point(aggregate_key)?;
        let nonce_address = address_from_point(&r).ok_or(SignatureError::VerificationFailed)?;
        if challenge(&x, message_hash, &nonce_address) != e || !verify(&r, &s, &e, &x) {
            return Err(SignatureError::VerificationFailed);
        }
        Ok(())
    }
}

/// Verify a combined signature against an encoded aggregate key.
pub fn verify_multi(
    signature: &MultiSignature,
    aggregate_key: &PartyKey,
    message_hash: &Hash,
) -> Result<(), SignatureError> {
    signature.verify(aggregate_key, message_hash)
}

// =============================================================================
// SIGNING SESSION
// =============================================================================

/// Coordinates one multi-party signing round over a fixed message.
///
/// Collects public nonces and partial signatures from every participant and
/// refuses a session identifier the registry has seen before.
#[derive(Debug)]
pub struct SigningSession {
    session_id: Hash,
    message_hash: Hash,
    aggregate_key: AggregateKey,
    nonces: BTreeMap<PartyKey, PublicNonces>,
    partials: BTreeMap<PartyKey, PartialSignature>,
}

impl SigningSession {
    /// Open a round for `signers` over `message_hash`.
    pub fn new(
        session_id: Hash,
        message_hash: Hash,
        signers: &[PartyKey],
        registry: &ConsumedNonceRegistry,
    ) -> Result<Self, SignatureError> {
        let aggregate_key = aggregate_keys(signers)?;
        registry.consume(&session_id)?;
        debug!(
            session = %hex::encode(&session_id[..4]),
            signers = aggregate_key.coefficients.len(),
            "signing session opened"
        );
        Ok(Self {
            session_id,
            message_hash,
            aggregate_key,
            nonces: BTreeMap::new(),
            partials: BTreeMap::new(),
        })
    }

    /// Signing-session identifier to draw nonces for.
    #[must_use]
    pub fn session_id(&self) -> Hash {
        self.session_id
    }

    /// Aggregate key the combined signature verifies against.
    #[must_use]
    pub fn aggregate_key(&self) -> &AggregateKey {
        &self.aggregate_key
    }

    /// Record a participant's public nonces.
    pub fn add_nonces(&mut self, signer: PartyKey, nonces: PublicNonces) -> Result<(), SignatureError> {
        self.check_participant(&signer)?;
        if nonces.session_id != self.session_id {
            return Err(SignatureError::NonceSessionMismatch);
        }
        self.nonces.insert(signer, nonces);
        Ok(())
    }

    /// Aggregate nonce once every participant has contributed.
    pub fn aggregate_nonce(&self) -> Result<AggregateNonce, SignatureError> {
        let mut groups = Vec::with_capacity(self.nonces.len());
        for signer in self.aggregate_key.signers() {
            let group = self
                .nonces
                .get(signer)
                .ok_or_else(|| SignatureError::MissingSigner(signer.to_string()))?;
            groups.push(group.clone());
        }
        aggregate_nonces(&groups, &self.message_hash)
    }

    /// Produce `key`'s partial signature and record it.
    pub fn sign(&mut self, key: &KeyPair, nonces: &mut NonceSet) -> Result<PartialSignature, SignatureError> {
        let aggregate_nonce = self.aggregate_nonce()?;
        let e = multi_challenge(&self.aggregate_key, &aggregate_nonce, &self.message_hash)?;
        let partial = partial_sign(nonces, &aggregate_nonce, &self.aggregate_key, key, &e)?;
        self.partials.insert(partial.signer, partial.clone());
        Ok(partial)
    }

    /// Record a partial signature produced elsewhere.
    pub fn add_partial(&mut self, partial: PartialSignature) -> Result<(), SignatureError> {
        self.check_participant(&partial.signer)?;
        self.partials.insert(partial.signer, partial);
        Ok(())
    }

    /// Combine every partial and check the result before handing it out.
    pub fn finish(&self) -> Result<MultiSignature, SignatureError> {
        let mut partials = Vec::with_capacity(self.partials.len());
        for signer in self.aggregate_key.signers() {
            let partial = self
                .partials
                .get(signer)
                .ok_or_else(|| SignatureError::MissingSigner(signer.to_string()))?;
            partials.push(partial.clone());
        }
        let signature = combine(&partials)?;
        signature.verify(&self.aggregate_key.party_key, &self.message_hash)?;
        Ok(signature)
    }

    fn check_participant(&self, signer: &PartyKey) -> Result<(), SignatureError> {
        if self.aggregate_key.coefficients.contains_key(signer) {
            Ok(())
        } else {
            Err(SignatureError::UnknownSigner(signer.to_string()))
        }
    }
}
