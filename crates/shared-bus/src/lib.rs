//! # Shared Bus - Pipeline Plumbing for the Session Engine
//!
//! The session engine is a chain of independent consumer loops, each draining
//! its own bounded queue:
//!
//! ```text
//!  wire ──→ [ingress] ──→ [sequencing] ──→ [egress] ──┬──→ counterparty link
//!                                                     ├──→ [guardian egress] ──→ counterparty + mesh
//!                                                     └──→ downstream queues
//!                         [heartbeat] ─────────────────┘
//! ```
//!
//! This crate provides the pieces those loops are built from:
//!
//! - **`PeerLink`**: a cloneable handle to one ordered, bidirectional
//!   connection (TCP socket, in-memory pair, …); the engine only ever writes
//!   bytes into it.
//! - **`supervise`**: runs a `Stage` over its queue, catching errors and
//!   panics per item and backing off before continuing, so one bad message
//!   never ends a stage.
//! - **`InMemoryEventBus`**: broadcast of `EngineEvent`s (phase changes,
//!   advisory heartbeat timeouts, guardian churn) to whoever is watching.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod link;
pub mod publisher;
pub mod stage;
pub mod subscriber;

// Re-export main types
pub use events::{EngineEvent, EventFilter, EventTopic};
pub use link::{InboundFrame, LinkError, PeerLink};
pub use publisher::InMemoryEventBus;
pub use stage::{supervise, supervise_interval, Stage, StageError, StageReport};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum items buffered per pipeline queue and per event subscriber.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Delay before a stage resumes after an item failed or panicked.
pub const DEFAULT_RESTART_BACKOFF_MS: u64 = 250;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1000);
    }

    #[test]
    fn test_default_backoff_is_short() {
        assert!(DEFAULT_RESTART_BACKOFF_MS < 1000);
    }
}
