//! # In-Memory Custody Anchor
//!
//! Stands in for reading root and state from the custody contract.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::Hash;

use crate::ports::outbound::{AnchoredCustody, CustodyAnchor};

/// Custody id -> anchored PPM root and custody state.
#[derive(Debug, Default)]
pub struct InMemoryCustodyAnchor {
    custodies: RwLock<HashMap<String, AnchoredCustody>>,
}

impl InMemoryCustodyAnchor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor `root` for `custody_id`, replacing any previous root.
    ///
    /// A new custody starts in state 0; an existing one keeps its state.
    pub fn anchor(&self, custody_id: impl Into<String>, root: Hash) {
        self.custodies
            .write()
            .entry(custody_id.into())
            .and_modify(|c| c.root = root)
            .or_insert(AnchoredCustody { root, state: 0 });
    }

    /// Record a custody state change. Returns `false` for an unknown custody.
    pub fn set_state(&self, custody_id: &str, state: u8) -> bool {
        match self.custodies.write().get_mut(custody_id) {
            Some(custody) => {
                custody.state = state;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl CustodyAnchor for InMemoryCustodyAnchor {
    async fn anchored(&self, custody_id: &str) -> Option<AnchoredCustody> {
        self.custodies.read().get(custody_id).copied()
    }
}
