//! # Egress Routing

use serde::{Deserialize, Serialize};
use shared_bus::PeerLink;
use shared_types::{Message, PartyKey};

/// Where an outgoing message is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    /// Only the counterparty link.
    User,
    /// Counterparty, every guardian in the session mesh and our own guardian.
    #[default]
    Guardian,
    /// Settlement submission queue.
    Blockchain,
    /// Exchange / liquidity queue.
    Exchange,
}

/// A message on its way out.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub counterparty: PartyKey,
    /// Counterparty link at the time the message was built.
    pub link: PeerLink,
    pub message: Message,
    pub destination: Destination,
}

impl Outbound {
    #[must_use]
    pub fn new(counterparty: PartyKey, link: PeerLink, message: Message, destination: Destination) -> Self {
        Self {
            counterparty,
            link,
            message,
            destination,
        }
    }
}

/// A message that passed ingress verification.
#[derive(Debug, Clone)]
pub struct Verified {
    pub message: Message,
    /// Link the message arrived on.
    pub link: PeerLink,
}
