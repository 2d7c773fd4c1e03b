//! Ingress: parse, verify, forward. Failures are dropped here and never reach
//! sequencing.

use std::sync::Arc;

use async_trait::async_trait;
use shared_bus::{InboundFrame, Stage, StageError};
use shared_types::{Message, BEGIN_STRING};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::state::EngineState;
use crate::domain::errors::SessionError;
use crate::domain::routing::Verified;
use crate::domain::wire::verify_trailer;

pub(crate) struct IngressStage {
    pub state: Arc<EngineState>,
    pub sequencing: mpsc::Sender<Verified>,
}

impl IngressStage {
    fn check(&self, message: &Message) -> Result<(), SessionError> {
        if message.header.begin_string != BEGIN_STRING {
            return Err(shared_types::MessageError::InvalidField {
                field: "BeginString",
                reason: message.header.begin_string.clone(),
            }
            .into());
        }
        if message.header.target != self.state.own_key {
            return Err(SessionError::WrongTarget(message.header.target));
        }
        verify_trailer(message)
    }
}

#[async_trait]
impl Stage for IngressStage {
    type Item = InboundFrame;

    fn name(&self) -> &'static str {
        "ingress"
    }

    async fn process(&mut self, frame: InboundFrame) -> Result<(), StageError> {
        let message = match Message::from_wire(&frame.bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!(link = frame.link.id(), error = %e, "Dropping undecodable frame");
                return Ok(());
            }
        };
        if let Err(e) = self.check(&message) {
            warn!(
                sender = %message.header.sender.short(),
                msg_type = %message.msg_type(),
                seq = message.header.seq_num,
                error = %e,
                "Dropping unverified message"
            );
            return Ok(());
        }

        debug!(
            sender = %message.header.sender.short(),
            msg_type = %message.msg_type(),
            seq = message.header.seq_num,
            "Message verified"
        );
        self.sequencing
            .send(Verified {
                message,
                link: frame.link,
            })
            .await
            .map_err(|_| StageError::QueueClosed("sequencing"))
    }
}
