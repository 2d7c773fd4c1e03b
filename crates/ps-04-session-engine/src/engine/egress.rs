//! Egress routing and guardian fan-out.
//!
//! Counterparty-bound traffic (`User` and `Guardian`) shares the guardian
//! egress queue so the counterparty sees sequence numbers in the order they
//! were assigned. Downstream queues get the signed message itself.

use std::sync::Arc;

use async_trait::async_trait;
use shared_bus::{EngineEvent, Stage, StageError};
use shared_types::Message;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::state::EngineState;
use crate::domain::errors::SessionError;
use crate::domain::routing::{Destination, Outbound};
use crate::domain::wire::sign_once;

fn internal(e: SessionError) -> StageError {
    StageError::Internal(e.to_string())
}

pub(crate) struct EgressStage {
    pub state: Arc<EngineState>,
    pub guardian: mpsc::Sender<Outbound>,
    pub blockchain: mpsc::Sender<Message>,
    pub exchange: mpsc::Sender<Message>,
}

#[async_trait]
impl Stage for EgressStage {
    type Item = Outbound;

    fn name(&self) -> &'static str {
        "egress"
    }

    async fn process(&mut self, out: Outbound) -> Result<(), StageError> {
        let queue = match out.destination {
            Destination::User | Destination::Guardian => {
                return self
                    .guardian
                    .send(out)
                    .await
                    .map_err(|_| StageError::QueueClosed("guardian egress"));
            }
            Destination::Blockchain => &self.blockchain,
            Destination::Exchange => &self.exchange,
        };

        let signed = sign_once(out.message, self.state.signer.as_ref()).map_err(internal)?;
        let msg_type = signed.msg_type().clone();
        match queue.try_send(signed) {
            Ok(()) => {
                debug!(destination = ?out.destination, %msg_type, "Delivered downstream");
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(destination = ?out.destination, %msg_type, "Downstream queue full, message dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(destination = ?out.destination, %msg_type, "No downstream consumer, message dropped");
            }
        }
        Ok(())
    }
}

pub(crate) struct GuardianEgressStage {
    pub state: Arc<EngineState>,
}

#[async_trait]
impl Stage for GuardianEgressStage {
    type Item = Outbound;

    fn name(&self) -> &'static str {
        "guardian-egress"
    }

    async fn process(&mut self, out: Outbound) -> Result<(), StageError> {
        let counterparty = out.counterparty;
        let seq = out.message.header.seq_num;
        let msg_type = out.message.msg_type().clone();
        let bytes = self.state.seal(out.message).map_err(internal)?;

        if out.link.send(bytes.clone()).await.is_err() {
            warn!(counterparty = %counterparty.short(), %msg_type, seq, "Counterparty link closed");
        }
        if out.destination == Destination::User {
            return Ok(());
        }

        let mesh: Vec<_> = self
            .state
            .sessions
            .read()
            .get(&counterparty)
            .map(|s| {
                s.guardian_links
                    .iter()
                    .map(|(key, link)| (*key, link.clone()))
                    .collect()
            })
            .unwrap_or_default();
        for (guardian, link) in mesh {
            if link.send(bytes.clone()).await.is_err() {
                warn!(counterparty = %counterparty.short(), guardian = %guardian.short(), "Guardian link closed, removed from mesh");
                if let Some(session) = self.state.sessions.write().get_mut(&counterparty) {
                    session.guardian_links.remove(&guardian);
                }
                self.state.emit(EngineEvent::GuardianDropped {
                    counterparty: Some(counterparty),
                    guardian,
                });
            }
        }

        let own = self.state.own_guardian.read().clone();
        if let Some((guardian, link)) = own {
            if link.send(bytes).await.is_err() {
                error!(guardian = %guardian.short(), "Own guardian link lost");
                *self.state.own_guardian.write() = None;
                self.state.emit(EngineEvent::GuardianDropped {
                    counterparty: None,
                    guardian,
                });
            }
        }
        debug!(counterparty = %counterparty.short(), %msg_type, seq, "Witnessed message delivered");
        Ok(())
    }
}
