//! # Registry Records

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use shared_types::PartyKey;

/// One registry entry: where a guardian key can be reached as of a block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuardianRecord {
    pub public_key: PartyKey,
    /// `host:port` of the guardian.
    pub ip_address: String,
    pub block_number: u64,
}

/// Keep the most recent record per key.
///
/// The registry is append-only, so a later block supersedes earlier ones.
/// On a tie the record listed last wins.
#[must_use]
pub fn latest_records(records: impl IntoIterator<Item = GuardianRecord>) -> HashMap<PartyKey, GuardianRecord> {
    let mut latest: HashMap<PartyKey, GuardianRecord> = HashMap::new();
    for record in records {
        match latest.get(&record.public_key) {
            Some(existing) if existing.block_number > record.block_number => {}
            _ => {
                latest.insert(record.public_key, record);
            }
        }
    }
    latest
}
