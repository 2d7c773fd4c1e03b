//! # Mesh Errors

use shared_types::{ErrorKind, PartyKey};
use thiserror::Error;

/// Errors resolving or connecting guardians.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MeshError {
    /// The registry has no record for this key.
    #[error("No registry record for guardian {0}")]
    Unresolved(PartyKey),

    /// The registry query itself failed.
    #[error("Registry lookup failed: {0}")]
    Registry(String),

    /// Connecting to a resolved address failed.
    #[error("Connecting to {address} failed: {reason}")]
    ConnectFailed { address: String, reason: String },

    /// The party's own guardian link could not be established.
    #[error("Own guardian {guardian} unavailable: {reason}")]
    OwnGuardianUnavailable { guardian: PartyKey, reason: String },
}

impl MeshError {
    /// Every mesh failure is a connectivity failure.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ConnectivityFailure
    }
}
