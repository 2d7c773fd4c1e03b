//! # Signature Errors
//!
//! Error types for key aggregation, signing and verification.

use shared_types::ErrorKind;
use thiserror::Error;

/// Errors that can occur in the signature module.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// Cannot aggregate an empty list of public keys.
    #[error("Cannot aggregate an empty key set")]
    EmptyKeySet,

    /// Cannot aggregate an empty list of nonces (or a signer sent none).
    #[error("Cannot aggregate an empty nonce set")]
    EmptyNonceSet,

    /// Cannot combine an empty list of partial signatures.
    #[error("Cannot combine an empty list of partial signatures")]
    EmptyPartialSet,

    /// Key is not part of the aggregate signer set.
    #[error("Key {0} is not a participant")]
    UnknownSigner(String),

    /// A participant has not contributed yet.
    #[error("Missing contribution from {0}")]
    MissingSigner(String),

    /// Partial signatures were produced for different challenges.
    #[error("Partial signatures disagree on the challenge")]
    ChallengeMismatch,

    /// Bytes do not decode to a curve point or scalar.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Private key is zero or not below the curve order.
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Aggregation produced the point at infinity.
    #[error("Aggregation produced the identity point")]
    DegenerateAggregate,

    /// Public-key x-coordinate is not below (n/2)+1.
    #[error("Public key x-coordinate violates the half-order bound")]
    HalfOrderViolation,

    /// Signature does not verify for the given key and message.
    #[error("Signature verification failed")]
    VerificationFailed,

    /// The nonce set was already consumed by an earlier signature.
    #[error("Nonce set already consumed")]
    NonceReused,

    /// The nonce set was generated for a different signing session.
    #[error("Nonce set belongs to a different signing session")]
    NonceSessionMismatch,

    /// A signing-session identifier was used before.
    #[error("Signing session {0} already consumed")]
    SessionReplayed(String),
}

impl SignatureError {
    /// Taxonomy category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyKeySet
            | Self::EmptyNonceSet
            | Self::EmptyPartialSet
            | Self::UnknownSigner(_)
            | Self::MissingSigner(_)
            | Self::ChallengeMismatch
            | Self::InvalidEncoding(_)
            | Self::InvalidPrivateKey
            | Self::DegenerateAggregate => ErrorKind::InvalidInput,
            Self::HalfOrderViolation | Self::VerificationFailed => ErrorKind::VerificationFailure,
            Self::NonceReused | Self::NonceSessionMismatch | Self::SessionReplayed(_) => {
                ErrorKind::StateError
            }
        }
    }
}
