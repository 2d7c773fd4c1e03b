//! # Static Party Registry
//!
//! Serves registry records from memory (loaded from node configuration).
//! Stands in for the on-chain event-log query.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::PartyKey;

use crate::domain::entities::GuardianRecord;
use crate::domain::errors::MeshError;
use crate::ports::outbound::PartyRegistry;

/// In-memory, append-only registry.
#[derive(Debug, Default)]
pub struct StaticPartyRegistry {
    records: RwLock<Vec<GuardianRecord>>,
}

impl StaticPartyRegistry {
    #[must_use]
    pub fn new(records: Vec<GuardianRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Append a record, as a new registry event would.
    pub fn append(&self, record: GuardianRecord) {
        self.records.write().push(record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl PartyRegistry for StaticPartyRegistry {
    async fn lookup_guardians(
        &self,
        keys: &[PartyKey],
        _registry_address: &str,
    ) -> Result<Vec<GuardianRecord>, MeshError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|record| keys.contains(&record.public_key))
            .cloned()
            .collect())
    }
}
