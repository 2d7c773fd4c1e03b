//! # Driven Ports (Outbound SPI)

use async_trait::async_trait;
use shared_types::Hash;

/// What a custody contract currently records for one custody.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchoredCustody {
    /// Anchored PPM root.
    pub root: Hash,
    /// Current custody state; only leaves for this state can execute.
    pub state: u8,
}

/// Read access to the custody contracts.
#[async_trait]
pub trait CustodyAnchor: Send + Sync {
    /// Root and state currently anchored for `custody_id`, if any.
    async fn anchored(&self, custody_id: &str) -> Option<AnchoredCustody>;
}
