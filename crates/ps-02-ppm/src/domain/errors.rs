//! # PPM Errors

use ps_01_signature::SignatureError;
use shared_types::ErrorKind;
use thiserror::Error;

/// Errors from authoring, rendering or checking a PPM.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PpmError {
    /// Action name outside the supported set.
    #[error("Unsupported action type: {0}")]
    UnsupportedAction(String),

    /// Supported action with malformed arguments.
    #[error("Invalid arguments for {action}: {reason}")]
    InvalidArgs { action: String, reason: String },

    /// A tree needs at least one leaf.
    #[error("Cannot build a PPM tree without leaves")]
    EmptyTree,

    /// Leaf index outside the tree.
    #[error("Leaf index {index} out of range ({len} leaves)")]
    IndexOutOfRange { index: usize, len: usize },

    /// A party reference could not be resolved to a key.
    #[error("Unresolved party reference: {0}")]
    UnresolvedParty(String),

    /// A required signer did not attest the leaf.
    #[error("Missing attestation from {signer}")]
    MissingAttestation { signer: String },

    /// A signer's attestation does not verify.
    #[error("Invalid attestation from {signer}: {source}")]
    InvalidAttestation {
        signer: String,
        #[source]
        source: SignatureError,
    },

    /// The action does not match an anchored leaf or its signature fails.
    #[error("Action not authorized: {reason}")]
    Unauthorized { reason: String },
}

impl PpmError {
    /// Taxonomy category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedAction(_) => ErrorKind::UnsupportedAction,
            Self::InvalidArgs { .. }
            | Self::EmptyTree
            | Self::IndexOutOfRange { .. }
            | Self::UnresolvedParty(_) => ErrorKind::InvalidInput,
            Self::MissingAttestation { .. }
            | Self::InvalidAttestation { .. }
            | Self::Unauthorized { .. } => ErrorKind::VerificationFailure,
        }
    }

    pub(crate) fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }
}
