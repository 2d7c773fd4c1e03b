//! # Driven Ports (Outbound SPI)
//!
//! Interfaces the mesh **requires** from its host.

use async_trait::async_trait;
use shared_bus::PeerLink;
use shared_types::PartyKey;

use crate::domain::entities::GuardianRecord;
use crate::domain::errors::MeshError;

/// Read access to the append-only on-chain party registry.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; lookups run concurrently.
#[async_trait]
pub trait PartyRegistry: Send + Sync {
    /// All records for `keys` in `registry_address`.
    ///
    /// Keys without a record are simply absent from the result. Several
    /// records for one key may be returned.
    async fn lookup_guardians(
        &self,
        keys: &[PartyKey],
        registry_address: &str,
    ) -> Result<Vec<GuardianRecord>, MeshError>;
}

/// Opens links to guardian addresses.
#[async_trait]
pub trait GuardianConnector: Send + Sync {
    /// Connect to `address` and return the write half.
    ///
    /// Inbound traffic on the connection is the connector's business (the TCP
    /// adapter forwards it to the engine's ingress queue).
    async fn connect(&self, address: &str) -> Result<PeerLink, MeshError>;
}
