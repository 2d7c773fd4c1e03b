//! # Engine Events
//!
//! Observable facts the session engine publishes for calling logic. Nothing
//! inside the engine consumes them; they exist so operators and collaborators
//! can react (e.g. treat `HeartbeatOverdue` as a liveness alarm).

use serde::{Deserialize, Serialize};
use shared_types::{Hash, PartyKey, SessionPhase};

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEvent {
    // =========================================================================
    // SESSION LIFECYCLE
    // =========================================================================
    /// A session advanced to a new phase.
    PhaseChanged {
        counterparty: PartyKey,
        from: SessionPhase,
        to: SessionPhase,
    },

    /// No heartbeat has been received for twice the agreed interval.
    ///
    /// Advisory only: the session stays up.
    HeartbeatOverdue {
        counterparty: PartyKey,
        silent_for_secs: u64,
    },

    /// The session was torn down (logout or disconnect).
    SessionClosed { counterparty: PartyKey },

    // =========================================================================
    // GUARDIAN MESH
    // =========================================================================
    /// A guardian link was opened. `counterparty` is `None` for our own guardian.
    GuardianConnected {
        counterparty: Option<PartyKey>,
        guardian: PartyKey,
    },

    /// A guardian link closed and was removed from the session mesh.
    GuardianDropped {
        counterparty: Option<PartyKey>,
        guardian: PartyKey,
    },

    /// A guardian acknowledged a witnessed message.
    GuardianAck { guardian: PartyKey, ref_seq_num: u64 },

    // =========================================================================
    // AUTHORIZATION
    // =========================================================================
    /// A custody action matched a PPM leaf and carried valid signatures.
    ActionAuthorized {
        counterparty: PartyKey,
        leaf_index: usize,
        leaf_hash: Hash,
    },

    /// An inbound message was answered with a business reject.
    MessageRejected {
        counterparty: PartyKey,
        msg_type: String,
        reason: String,
    },
}

impl EngineEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::PhaseChanged { .. }
            | Self::HeartbeatOverdue { .. }
            | Self::SessionClosed { .. } => EventTopic::Session,
            Self::GuardianConnected { .. }
            | Self::GuardianDropped { .. }
            | Self::GuardianAck { .. } => EventTopic::Guardian,
            Self::ActionAuthorized { .. } => EventTopic::Authorization,
            Self::MessageRejected { .. } => EventTopic::Rejection,
        }
    }

    /// Counterparty the event concerns, if any.
    #[must_use]
    pub fn counterparty(&self) -> Option<PartyKey> {
        match self {
            Self::PhaseChanged { counterparty, .. }
            | Self::HeartbeatOverdue { counterparty, .. }
            | Self::SessionClosed { counterparty }
            | Self::ActionAuthorized { counterparty, .. }
            | Self::MessageRejected { counterparty, .. } => Some(*counterparty),
            Self::GuardianConnected { counterparty, .. }
            | Self::GuardianDropped { counterparty, .. } => *counterparty,
            Self::GuardianAck { .. } => None,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Phase changes, heartbeat alarms, teardown.
    Session,
    /// Guardian mesh churn and acknowledgements.
    Guardian,
    /// Authorized custody actions.
    Authorization,
    /// Business rejects sent back to a counterparty.
    Rejection,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Counterparties to include. Empty means all counterparties.
    pub counterparties: Vec<PartyKey>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            counterparties: Vec::new(),
        }
    }

    /// Create a filter for events about specific counterparties.
    ///
    /// Events without a counterparty (own-guardian churn, ACKs) never match.
    #[must_use]
    pub fn for_counterparties(counterparties: Vec<PartyKey>) -> Self {
        Self {
            topics: Vec::new(),
            counterparties,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &EngineEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let counterparty_match = self.counterparties.is_empty()
            || event
                .counterparty()
                .is_some_and(|c| self.counterparties.contains(&c));

        topic_match && counterparty_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(fill: u8) -> PartyKey {
        let mut bytes = [fill; 33];
        bytes[0] = 0x02;
        PartyKey::new(bytes)
    }

    fn phase_event(counterparty: PartyKey) -> EngineEvent {
        EngineEvent::PhaseChanged {
            counterparty,
            from: SessionPhase::Init,
            to: SessionPhase::PkXchg,
        }
    }

    #[test]
    fn test_event_topic_mapping() {
        assert_eq!(phase_event(key(1)).topic(), EventTopic::Session);
        let ack = EngineEvent::GuardianAck {
            guardian: key(2),
            ref_seq_num: 4,
        };
        assert_eq!(ack.topic(), EventTopic::Guardian);
        assert_eq!(ack.counterparty(), None);
    }

    #[test]
    fn test_filter_all() {
        assert!(EventFilter::all().matches(&phase_event(key(1))));
    }

    #[test]
    fn test_filter_by_topic() {
        let filter = EventFilter::topics(vec![EventTopic::Guardian]);
        assert!(!filter.matches(&phase_event(key(1))));
        assert!(filter.matches(&EngineEvent::GuardianDropped {
            counterparty: None,
            guardian: key(3),
        }));
    }

    #[test]
    fn test_filter_by_counterparty() {
        let filter = EventFilter::for_counterparties(vec![key(1)]);
        assert!(filter.matches(&phase_event(key(1))));
        assert!(!filter.matches(&phase_event(key(2))));
        assert!(!filter.matches(&EngineEvent::GuardianAck {
            guardian: key(1),
            ref_seq_num: 1,
        }));
    }
}
