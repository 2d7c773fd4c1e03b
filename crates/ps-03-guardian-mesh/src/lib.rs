//! # Guardian Mesh (PS-03)
//!
//! Every party runs one or more guardians: redundant witnessing nodes that
//! receive a copy of each signed message. The mesh resolves guardian keys to
//! network addresses through an append-only party registry and opens links
//! to them.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): registry records, latest-record selection
//! - **Ports Layer** (`ports/`): `PartyRegistry`, `GuardianConnector`
//! - **Adapters Layer** (`adapters/`): static registry, TCP and in-memory connectors
//! - **Service** (`service.rs`): `GuardianMesh`
//!
//! ## Failure Policy
//!
//! - The party's own guardian link is a startup precondition
//!   (`connect_own` fails with `ConnectivityFailure`).
//! - Counterparty guardians are best effort: unresolvable or unreachable ones
//!   are logged and skipped.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

// Re-export public API
pub use adapters::memory::InMemoryGuardianConnector;
pub use adapters::registry::StaticPartyRegistry;
pub use adapters::tcp::{
    serve, spawn_connection, TcpGuardianConnector, DEFAULT_CONNECT_TIMEOUT,
};
pub use domain::entities::{latest_records, GuardianRecord};
pub use domain::errors::MeshError;
pub use ports::outbound::{GuardianConnector, PartyRegistry};
pub use service::GuardianMesh;
