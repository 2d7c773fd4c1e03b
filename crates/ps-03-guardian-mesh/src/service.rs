//! # Guardian Mesh Service
//!
//! Resolves guardian keys through the registry and opens links to them.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use shared_bus::PeerLink;
use shared_types::PartyKey;
use tracing::{debug, info, warn};

use crate::domain::entities::{latest_records, GuardianRecord};
use crate::domain::errors::MeshError;
use crate::ports::outbound::{GuardianConnector, PartyRegistry};

/// Registry + connector pair scoped to one registry contract.
#[derive(Clone)]
pub struct GuardianMesh {
    registry: Arc<dyn PartyRegistry>,
    connector: Arc<dyn GuardianConnector>,
    registry_address: String,
}

impl GuardianMesh {
    #[must_use]
    pub fn new(
        registry: Arc<dyn PartyRegistry>,
        connector: Arc<dyn GuardianConnector>,
        registry_address: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            connector,
            registry_address: registry_address.into(),
        }
    }

    /// Registry address used for lookups.
    #[must_use]
    pub fn registry_address(&self) -> &str {
        &self.registry_address
    }

    /// Latest registry record for each of `keys` that has one.
    pub async fn resolve(
        &self,
        keys: &[PartyKey],
    ) -> Result<HashMap<PartyKey, GuardianRecord>, MeshError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let records = self
            .registry
            .lookup_guardians(keys, &self.registry_address)
            .await?;
        let mut latest = latest_records(records);
        latest.retain(|key, _| keys.contains(key));
        Ok(latest)
    }

    /// Connect to one guardian by key.
    pub async fn connect(&self, key: PartyKey) -> Result<PeerLink, MeshError> {
        let record = self
            .resolve(&[key])
            .await?
            .remove(&key)
            .ok_or(MeshError::Unresolved(key))?;
        let link = self.connector.connect(&record.ip_address).await?;
        debug!(guardian = %key.short(), address = %record.ip_address, "Guardian link open");
        Ok(link)
    }

    /// Link to the party's own guardian.
    ///
    /// Failure here means the node must not start.
    pub async fn connect_own(&self, key: PartyKey) -> Result<PeerLink, MeshError> {
        match self.connect(key).await {
            Ok(link) => {
                info!(guardian = %key.short(), "Own guardian connected");
                Ok(link)
            }
            Err(e) => Err(MeshError::OwnGuardianUnavailable {
                guardian: key,
                reason: e.to_string(),
            }),
        }
    }

    /// Connect to every guardian in `keys` concurrently.
    ///
    /// Guardians that cannot be resolved or reached are logged and left out.
    pub async fn connect_all(&self, keys: &[PartyKey]) -> Vec<(PartyKey, PeerLink)> {
        let records = match self.resolve(keys).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Guardian lookup failed, continuing without counterparty guardians");
                return Vec::new();
            }
        };

        let attempts = keys.iter().map(|key| {
            let record = records.get(key).cloned();
            async move {
                let Some(record) = record else {
                    return Err((*key, MeshError::Unresolved(*key)));
                };
                self.connector
                    .connect(&record.ip_address)
                    .await
                    .map(|link| (*key, link))
                    .map_err(|e| (*key, e))
            }
        });

        let mut connected = Vec::new();
        for outcome in join_all(attempts).await {
            match outcome {
                Ok(pair) => connected.push(pair),
                Err((key, e)) => warn!(guardian = %key.short(), error = %e, "Skipping guardian"),
            }
        }
        info!(requested = keys.len(), connected = connected.len(), "Guardian mesh connected");
        connected
    }
}

impl std::fmt::Debug for GuardianMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardianMesh")
            .field("registry_address", &self.registry_address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryGuardianConnector;
    use crate::adapters::registry::StaticPartyRegistry;

    fn key(fill: u8) -> PartyKey {
        let mut bytes = [fill; 33];
        bytes[0] = 0x02;
        PartyKey::new(bytes)
    }

    fn record(fill: u8, ip: &str, block: u64) -> GuardianRecord {
        GuardianRecord {
            public_key: key(fill),
            ip_address: ip.into(),
            block_number: block,
        }
    }

    fn mesh(records: Vec<GuardianRecord>) -> (GuardianMesh, Arc<InMemoryGuardianConnector>) {
        let connector = Arc::new(InMemoryGuardianConnector::new());
        let mesh = GuardianMesh::new(
            Arc::new(StaticPartyRegistry::new(records)),
            connector.clone(),
            "0xregistry",
        );
        (mesh, connector)
    }

    #[tokio::test]
    async fn test_resolve_uses_latest_record() {
        let (mesh, _) = mesh(vec![record(1, "old:1", 1), record(1, "new:1", 2)]);
        let resolved = mesh.resolve(&[key(1), key(9)]).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[&key(1)].ip_address, "new:1");
    }

    #[tokio::test]
    async fn test_connect_own_requires_link() {
        let (mesh, connector) = mesh(vec![record(1, "g1:9000", 1)]);
        let err = mesh.connect_own(key(1)).await.unwrap_err();
        assert!(matches!(err, MeshError::OwnGuardianUnavailable { .. }));

        let (link, _rx) = PeerLink::channel(4);
        connector.register("g1:9000", link.clone());
        assert_eq!(mesh.connect_own(key(1)).await.unwrap().id(), link.id());
    }

    #[tokio::test]
    async fn test_connect_own_unresolved() {
        let (mesh, _) = mesh(Vec::new());
        match mesh.connect_own(key(1)).await {
            Err(MeshError::OwnGuardianUnavailable { guardian, .. }) => assert_eq!(guardian, key(1)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_all_skips_failures() {
        let (mesh, connector) = mesh(vec![
            record(1, "g1:9000", 1),
            record(2, "g2:9000", 1),
        ]);
        let (link, _rx) = PeerLink::channel(4);
        connector.register("g1:9000", link);

        // key(2) resolves but is unreachable, key(3) is unknown.
        let connected = mesh.connect_all(&[key(1), key(2), key(3)]).await;
        assert_eq!(connected.len(), 1);
        assert_eq!(connected[0].0, key(1));
    }

    #[tokio::test]
    async fn test_connect_all_empty() {
        let (mesh, _) = mesh(Vec::new());
        assert!(mesh.connect_all(&[]).await.is_empty());
    }
}
