//! # Session Protocol Engine (PS-04)
//!
//! One state machine per counterparty, identical for both roles:
//!
//! ```text
//! INIT --PPMH / PPMT--> PKXCHG --A / A--> TRADE
//! ```
//!
//! The trader sends the template request (`PPMH`); the solver answers with
//! its PPM template (`PPMT`); both log on (`A`) with their guardian keys and
//! heartbeat interval, render the PPM locally and enter `TRADE`. A message
//! that does not fit the current phase is answered with a business reject
//! (`j`) and changes nothing.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): `Session`, trailer signing, routing types
//! - **Ports Layer** (`ports/`): `SessionHandler`, `CustodyAnchor`
//! - **Adapters Layer** (`adapters/`): in-memory custody anchor
//! - **Engine** (`engine/`): supervised stages and the public `Engine` API
//!
//! ## Failure Policy
//!
//! | Failure | Handling |
//! |---------|----------|
//! | Bad or missing trailer signature | Dropped at ingress, no reply |
//! | Replayed `MsgSeqNum` | Dropped at sequencing, no reply |
//! | Wrong phase / role, unauthorized action | Business reject |
//! | Unreachable counterparty guardian | Logged, guardian skipped |
//! | Own guardian unreachable at start | Engine does not start |

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod engine;
pub mod ports;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export public API
pub use adapters::anchor::InMemoryCustodyAnchor;
pub use config::EngineConfig;
pub use domain::errors::SessionError;
pub use domain::routing::Destination;
pub use domain::session::Session;
pub use domain::wire::{ack, business_reject, sign_once, verify_trailer, Logon};
pub use engine::{Downstream, Engine, EngineBuilder, SessionSnapshot};
pub use ports::inbound::{SessionHandler, TemplateHandler};
pub use ports::outbound::{AnchoredCustody, CustodyAnchor};
