//! # pSymm Node Runtime
//!
//! Wires the session engine to real transports:
//!
//! - `config` - TOML file plus environment overrides
//! - `runtime` - engine startup, TCP accept loop, graceful shutdown
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (fails without a private key)
//! 2. Link the own guardian (fails fast if unreachable)
//! 3. Start the engine stages
//! 4. Accept counterparty connections on the listen address
//! 5. Trader only: dial the configured counterparty and send `PPMH`

pub mod config;
pub mod runtime;

pub use config::{ConfigError, NodeConfig};
pub use runtime::NodeRuntime;
