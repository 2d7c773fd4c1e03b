//! # Error Types
//!
//! The protocol-wide error taxonomy plus wire-shape errors.

use thiserror::Error;

/// Protocol error categories.
///
/// Every crate-level error maps onto one of these so the engine can decide
/// whether to drop a message, reject it, or just log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Empty key/nonce sets, malformed leaf args. Never retried.
    InvalidInput,
    /// Bad signature, half-order violation, proof mismatch. Message dropped.
    VerificationFailure,
    /// Unknown action type at policy-authoring time.
    UnsupportedAction,
    /// Wrong phase for the message type, reused nonce set. Answered with a reject.
    StateError,
    /// Guardian lookup/connect failure. Logged, redundancy degraded.
    ConnectivityFailure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InvalidInput => "invalid input",
            Self::VerificationFailure => "verification failure",
            Self::UnsupportedAction => "unsupported action",
            Self::StateError => "state error",
            Self::ConnectivityFailure => "connectivity failure",
        };
        f.write_str(name)
    }
}

/// Errors decoding or building wire messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessageError {
    /// The bytes are not a JSON message of the expected shape.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// A required body field is absent.
    #[error("Missing body field: {0}")]
    MissingField(&'static str),

    /// A body field is present but has the wrong type.
    #[error("Invalid body field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// A public key string is not 33 bytes of hex.
    #[error("Invalid public key: {0}")]
    InvalidKey(String),
}

impl MessageError {
    /// Taxonomy category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidInput
    }
}
