//! # In-Memory Connector
//!
//! Hands out pre-registered links by address. Used to wire engines together
//! without sockets.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_bus::PeerLink;

use crate::domain::errors::MeshError;
use crate::ports::outbound::GuardianConnector;

/// Connector backed by a map of address -> link.
#[derive(Debug, Default)]
pub struct InMemoryGuardianConnector {
    links: RwLock<HashMap<String, PeerLink>>,
}

impl InMemoryGuardianConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `link` reachable at `address`.
    pub fn register(&self, address: impl Into<String>, link: PeerLink) {
        self.links.write().insert(address.into(), link);
    }

    /// Make `address` unreachable.
    pub fn unregister(&self, address: &str) {
        self.links.write().remove(address);
    }
}

#[async_trait]
impl GuardianConnector for InMemoryGuardianConnector {
    async fn connect(&self, address: &str) -> Result<PeerLink, MeshError> {
        let link = self.links.read().get(address).cloned();
        match link {
            Some(link) if !link.is_closed() => Ok(link),
            Some(_) => Err(MeshError::ConnectFailed {
                address: address.to_string(),
                reason: "link closed".into(),
            }),
            None => Err(MeshError::ConnectFailed {
                address: address.to_string(),
                reason: "no listener".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_registered_address() {
        let connector = InMemoryGuardianConnector::new();
        let (link, mut rx) = PeerLink::channel(4);
        connector.register("g1", link);

        let connected = connector.connect("g1").await.unwrap();
        connected.send(b"ping".to_vec()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_connect_unknown_or_closed() {
        let connector = InMemoryGuardianConnector::new();
        assert!(connector.connect("nowhere").await.is_err());

        let (link, rx) = PeerLink::channel(1);
        connector.register("gone", link);
        drop(rx);
        assert!(matches!(
            connector.connect("gone").await,
            Err(MeshError::ConnectFailed { .. })
        ));

        connector.unregister("gone");
        assert!(connector.connect("gone").await.is_err());
    }
}
