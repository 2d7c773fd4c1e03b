//! # Node Configuration
//!
//! Loaded from a TOML file, then overridden from the environment:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `PSYMM_CONFIG` | path of the TOML file (default `psymm.toml`) |
//! | `PSYMM_PRIVATE_KEY` | `private_key` (hex) |
//! | `PSYMM_LISTEN_ADDR` | `listen_addr` |
//! | `PSYMM_HEARTBEAT_SECS` | `heartbeat_secs` |
//!
//! A missing file is not an error; a missing private key is.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ps_01_signature::{KeyPair, SignatureError};
use ps_03_guardian_mesh::{GuardianConnector, GuardianMesh, GuardianRecord, StaticPartyRegistry};
use ps_04_session_engine::EngineConfig;
use serde::Deserialize;
use shared_bus::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_RESTART_BACKOFF_MS};
use shared_types::{PartyKey, PartyRole};
use thiserror::Error;
use tracing::info;

pub const CONFIG_PATH_VAR: &str = "PSYMM_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "psymm.toml";
pub const PRIVATE_KEY_VAR: &str = "PSYMM_PRIVATE_KEY";
pub const LISTEN_ADDR_VAR: &str = "PSYMM_LISTEN_ADDR";
pub const HEARTBEAT_VAR: &str = "PSYMM_HEARTBEAT_SECS";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Neither the file nor `PSYMM_PRIVATE_KEY` provides a signing key.
    #[error("No private key configured (set private_key or {PRIVATE_KEY_VAR})")]
    MissingPrivateKey,

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(#[source] SignatureError),

    #[error("Invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Hex private key. Never printed.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct SecretHex(String);

impl fmt::Debug for SecretHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretHex(***)")
    }
}

/// Counterparty to open a session with at startup (trader only).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CounterpartyConfig {
    /// `host:port` of the counterparty node.
    pub address: String,
    pub public_key: PartyKey,
}

/// Complete node configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub role: PartyRole,
    pub private_key: Option<SecretHex>,
    /// Address counterparties connect to.
    pub listen_addr: String,
    /// Guardian keys advertised in logon, in PPM slot order.
    pub own_guardians: Vec<PartyKey>,
    /// Guardian linked at startup; the first of `own_guardians` if unset.
    pub own_guardian: Option<PartyKey>,
    pub registry_address: String,
    pub heartbeat_secs: u64,
    pub queue_capacity: usize,
    pub restart_backoff_ms: u64,
    /// Static guardian registry records.
    pub registry: Vec<GuardianRecord>,
    pub counterparty: Option<CounterpartyConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: PartyRole::Solver,
            private_key: None,
            listen_addr: "127.0.0.1:7400".to_string(),
            own_guardians: Vec::new(),
            own_guardian: None,
            registry_address: String::new(),
            heartbeat_secs: ps_04_session_engine::config::DEFAULT_HEARTBEAT_SECS,
            queue_capacity: DEFAULT_CHANNEL_CAPACITY,
            restart_backoff_ms: DEFAULT_RESTART_BACKOFF_MS,
            registry: Vec::new(),
            counterparty: None,
        }
    }
}

impl NodeConfig {
    /// Load from `PSYMM_CONFIG` (or `psymm.toml`) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_path(Path::new(&path))?;
        config.apply_env(|var| std::env::var(var).ok())?;
        config.signing_key()?;
        Ok(config)
    }

    /// Parse a TOML file; a missing file yields the defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                info!(path = %path.display(), "Loaded configuration file");
                Self::from_toml(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(key) = lookup(PRIVATE_KEY_VAR) {
            self.private_key = Some(SecretHex(key));
        }
        if let Some(addr) = lookup(LISTEN_ADDR_VAR) {
            self.listen_addr = addr;
        }
        if let Some(secs) = lookup(HEARTBEAT_VAR) {
            self.heartbeat_secs = secs
                .parse()
                .ok()
                .filter(|s| *s > 0)
                .ok_or(ConfigError::InvalidEnv {
                    var: HEARTBEAT_VAR,
                    value: secs,
                })?;
        }
        Ok(())
    }

    /// The node's signing key.
    pub fn signing_key(&self) -> Result<KeyPair, ConfigError> {
        let secret = self
            .private_key
            .as_ref()
            .ok_or(ConfigError::MissingPrivateKey)?;
        KeyPair::from_hex(&secret.0).map_err(ConfigError::InvalidPrivateKey)
    }

    /// Guardian mesh over the static registry records, dialing with `connector`.
    #[must_use]
    pub fn guardian_mesh(&self, connector: Arc<dyn GuardianConnector>) -> GuardianMesh {
        GuardianMesh::new(
            Arc::new(StaticPartyRegistry::new(self.registry.clone())),
            connector,
            self.registry_address.clone(),
        )
    }

    /// Engine settings derived from this config.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::new(self.role, self.own_guardians.clone());
        engine.own_guardian = self.own_guardian;
        engine.heartbeat_interval_secs = self.heartbeat_secs;
        engine.queue_capacity = self.queue_capacity;
        engine.restart_backoff_ms = self.restart_backoff_ms;
        engine
    }
}
