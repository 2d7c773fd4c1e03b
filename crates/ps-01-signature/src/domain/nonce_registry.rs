//! # Consumed Nonce Registry
//!
//! Remembers every signing-session identifier (or action nonce digest) that
//! has been used, so a second signature over the same nonces is refused
//! before any secret material is touched.
//!
//! Entries are never expired: forgetting one would re-open the replay.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use shared_types::Hash;

use super::errors::SignatureError;

/// Thread-safe set of consumed identifiers.
#[derive(Debug, Default)]
pub struct ConsumedNonceRegistry {
    /// Identifier -> Unix seconds when it was first consumed.
    consumed: Mutex<HashMap<Hash, u64>>,
}

impl ConsumedNonceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` consumed.
    ///
    /// # Errors
    ///
    /// `SessionReplayed` if `id` was consumed before.
    pub fn consume(&self, id: &Hash) -> Result<(), SignatureError> {
        let mut consumed = self.consumed.lock();
        if consumed.contains_key(id) {
            return Err(SignatureError::SessionReplayed(format!("0x{}", hex::encode(id))));
        }
        consumed.insert(*id, Self::current_timestamp());
        Ok(())
    }

    /// Check if an identifier was consumed without recording it.
    #[must_use]
    pub fn contains(&self, id: &Hash) -> bool {
        self.consumed.lock().contains_key(id)
    }

    /// Unix seconds at which `id` was consumed.
    #[must_use]
    pub fn consumed_at(&self, id: &Hash) -> Option<u64> {
        self.consumed.lock().get(id).copied()
    }

    /// Number of consumed identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.consumed.lock().len()
    }

    /// Check if nothing has been consumed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consumed.lock().is_empty()
    }

    fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
