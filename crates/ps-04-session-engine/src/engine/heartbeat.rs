//! Periodic heartbeat sweep. Overdue counterparties are reported, never
//! disconnected.

use std::sync::Arc;

use async_trait::async_trait;
use shared_bus::{EngineEvent, Stage, StageError};
use shared_types::{Message, MsgType, PartyKey};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::state::EngineState;
use crate::domain::errors::SessionError;
use crate::domain::routing::{Destination, Outbound};

pub(crate) struct HeartbeatStage {
    pub state: Arc<EngineState>,
    pub egress: mpsc::Sender<Outbound>,
}

#[async_trait]
impl Stage for HeartbeatStage {
    type Item = Instant;

    fn name(&self) -> &'static str {
        "heartbeat"
    }

    async fn process(&mut self, now: Instant) -> Result<(), StageError> {
        let mut due: Vec<PartyKey> = Vec::new();
        let mut overdue = Vec::new();
        for session in self.state.sessions.write().values_mut() {
            if let Some(silent) = session.take_overdue(now) {
                overdue.push((session.counterparty(), silent));
            }
            if session.take_heartbeat_due(now) {
                due.push(session.counterparty());
            }
        }

        for (counterparty, silent) in overdue {
            warn!(counterparty = %counterparty.short(), silent_secs = silent.as_secs(), "Heartbeat overdue");
            self.state.emit(EngineEvent::HeartbeatOverdue {
                counterparty,
                silent_for_secs: silent.as_secs(),
            });
        }

        let own = self.state.own_key;
        for counterparty in due {
            let sent = self
                .state
                .enqueue(&self.egress, &counterparty, Destination::Guardian, |seq| {
                    Message::new(MsgType::Heartbeat, own, counterparty, seq)
                })
                .await;
            match sent {
                Ok(seq) => debug!(counterparty = %counterparty.short(), seq, "Heartbeat queued"),
                // Torn down since the sweep started.
                Err(SessionError::UnknownSession(_)) => {}
                Err(e) => return Err(StageError::Internal(e.to_string())),
            }
        }
        Ok(())
    }
}
