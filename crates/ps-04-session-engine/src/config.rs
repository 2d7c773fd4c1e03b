//! # Engine Configuration
//!
//! Everything but the signing key, which is handed to the engine separately
//! so configs can be logged and cloned freely.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared_bus::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_RESTART_BACKOFF_MS};
use shared_types::{PartyKey, PartyRole};

/// Default `HeartBtInt` in seconds.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Largest `HeartBtInt` accepted from a counterparty, in seconds.
pub const DEFAULT_MAX_HEARTBEAT_SECS: u64 = 3600;

/// Heartbeat sweep period in milliseconds.
pub const DEFAULT_HEARTBEAT_TICK_MS: u64 = 1000;

/// Session engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Which side of the relationship this party plays.
    pub role: PartyRole,
    /// Guardian keys advertised in our logon, in PPM slot order.
    pub own_guardians: Vec<PartyKey>,
    /// Guardian the engine links to at startup. Defaults to the first of
    /// `own_guardians`.
    pub own_guardian: Option<PartyKey>,
    /// Heartbeat interval advertised in logon, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Counterparty logons advertising a longer interval are rejected.
    pub max_heartbeat_secs: u64,
    /// Capacity of every pipeline queue.
    pub queue_capacity: usize,
    /// Delay before a faulted stage resumes, in milliseconds.
    pub restart_backoff_ms: u64,
    /// Heartbeat sweep period, in milliseconds.
    pub heartbeat_tick_ms: u64,
}

impl EngineConfig {
    #[must_use]
    pub fn new(role: PartyRole, own_guardians: Vec<PartyKey>) -> Self {
        Self {
            role,
            own_guardians,
            own_guardian: None,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_SECS,
            max_heartbeat_secs: DEFAULT_MAX_HEARTBEAT_SECS,
            queue_capacity: DEFAULT_CHANNEL_CAPACITY,
            restart_backoff_ms: DEFAULT_RESTART_BACKOFF_MS,
            heartbeat_tick_ms: DEFAULT_HEARTBEAT_TICK_MS,
        }
    }

    /// Guardian linked at startup.
    #[must_use]
    pub fn startup_guardian(&self) -> Option<PartyKey> {
        self.own_guardian.or_else(|| self.own_guardians.first().copied())
    }

    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    #[must_use]
    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    #[must_use]
    pub fn heartbeat_tick(&self) -> Duration {
        Duration::from_millis(self.heartbeat_tick_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(fill: u8) -> PartyKey {
        let mut bytes = [fill; 33];
        bytes[0] = 0x03;
        PartyKey::new(bytes)
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new(PartyRole::Trader, vec![key(1)]);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.max_heartbeat_secs, 3600);
        assert_eq!(config.queue_capacity, 1000);
        assert_eq!(config.restart_backoff(), Duration::from_millis(250));
        assert_eq!(config.heartbeat_tick(), Duration::from_secs(1));
    }

    #[test]
    fn test_startup_guardian_fallback() {
        let mut config = EngineConfig::new(PartyRole::Solver, vec![key(1), key(2)]);
        assert_eq!(config.startup_guardian(), Some(key(1)));
        config.own_guardian = Some(key(2));
        assert_eq!(config.startup_guardian(), Some(key(2)));
        assert_eq!(EngineConfig::new(PartyRole::Solver, Vec::new()).startup_guardian(), None);
    }
}
