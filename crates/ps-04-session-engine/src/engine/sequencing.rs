//! Sequencing and dispatch: the single writer of session state for inbound
//! traffic. Handler failures become business rejects; nothing escapes the
//! stage except a closed queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ps_02_ppm::{authorize, ActionRequest, PpmTemplate};
use shared_bus::{EngineEvent, PeerLink, Stage, StageError};
use shared_types::{Message, MessageError, MsgType, PartyKey, PartyRole, SessionPhase};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::state::EngineState;
use crate::domain::errors::SessionError;
use crate::domain::routing::{Destination, Outbound, Verified};
use crate::domain::session::Session;
use crate::domain::wire::{
    ack, business_reject, Logon, FIELD_ACTION, FIELD_HEARTBEAT, FIELD_REF_MSG_TYPE,
    FIELD_REF_SEQ_NUM, FIELD_TEMPLATE, FIELD_TEXT,
};

/// Body fields of the settlement copy of an authorized action.
const FIELD_LEAF_INDEX: &str = "LeafIndex";
const FIELD_LEAF_HASH: &str = "LeafHash";
const FIELD_PROOF: &str = "Proof";

pub(crate) struct SequencingStage {
    pub state: Arc<EngineState>,
    pub egress: mpsc::Sender<Outbound>,
}

#[async_trait]
impl Stage for SequencingStage {
    type Item = Verified;

    fn name(&self) -> &'static str {
        "sequencing"
    }

    async fn process(&mut self, item: Verified) -> Result<(), StageError> {
        let Verified { message, link } = item;
        let msg_type = message.msg_type().clone();

        if msg_type == MsgType::Ack && self.state.is_guardian(&message.header.sender) {
            self.on_guardian_ack(&message);
            return Ok(());
        }
        if !self.admit(&message, &link) {
            return Ok(());
        }

        let outcome = match &msg_type {
            MsgType::PpmTemplateRequest => self.on_template_request(&message).await,
            MsgType::PpmTemplateResponse => self.on_template_response(&message).await,
            MsgType::Logon => self.on_logon(&message).await,
            MsgType::Heartbeat => self.on_heartbeat(&message),
            MsgType::Ack => {
                self.on_ack(&message);
                Ok(())
            }
            MsgType::BusinessReject => {
                self.on_reject(&message);
                Ok(())
            }
            MsgType::Logout => {
                self.state.teardown(&message.header.sender, "logout");
                Ok(())
            }
            MsgType::CustodyAction => self.on_custody_action(&message).await,
            MsgType::Trade(_) => self.on_trade(&message, link).await,
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(SessionError::QueueClosed(queue)) => Err(StageError::QueueClosed(queue)),
            Err(e) => self.reject(&message, e).await,
        }
    }
}

impl SequencingStage {
    /// Find or create the session and apply the inbound sequence check.
    fn admit(&self, message: &Message, link: &PeerLink) -> bool {
        let sender = message.header.sender;
        let seq = message.header.seq_num;
        let is_request = *message.msg_type() == MsgType::PpmTemplateRequest;

        // A template request on a new link is a reconnect: start over.
        if is_request {
            let stale = self
                .state
                .sessions
                .read()
                .get(&sender)
                .is_some_and(|s| s.link().id() != link.id());
            if stale {
                self.state.teardown(&sender, "counterparty reconnected");
            }
        }

        let now = Instant::now();
        let mut sessions = self.state.sessions.write();
        if !sessions.contains_key(&sender) {
            if !is_request {
                warn!(
                    sender = %sender.short(),
                    msg_type = %message.msg_type(),
                    "No session, message dropped"
                );
                return false;
            }
            info!(counterparty = %sender.short(), "Session opened by counterparty");
            sessions.insert(
                sender,
                Session::new(sender, link.clone(), self.state.config.heartbeat_interval(), now),
            );
        }
        let Some(session) = sessions.get_mut(&sender) else {
            return false;
        };
        if let Err(e) = session.accept_inbound(seq) {
            warn!(counterparty = %sender.short(), error = %e, "Replay dropped");
            return false;
        }
        session.record_heartbeat(now);
        true
    }

    fn with_session<R>(
        &self,
        counterparty: &PartyKey,
        f: impl FnOnce(&mut Session) -> Result<R, SessionError>,
    ) -> Result<R, SessionError> {
        let mut sessions = self.state.sessions.write();
        let session = sessions
            .get_mut(counterparty)
            .ok_or(SessionError::UnknownSession(*counterparty))?;
        f(session)
    }

    fn advance(&self, session: &mut Session, msg_type: &MsgType) -> Result<(), SessionError> {
        let from = session.advance(msg_type)?;
        let to = session.phase();
        info!(counterparty = %session.counterparty().short(), %from, %to, "Phase advanced");
        self.state.emit(EngineEvent::PhaseChanged {
            counterparty: session.counterparty(),
            from,
            to,
        });
        Ok(())
    }

    fn expect_role(&self, role: PartyRole, msg_type: &MsgType) -> Result<(), SessionError> {
        if self.state.config.role == role {
            Ok(())
        } else {
            Err(SessionError::WrongRole {
                msg_type: msg_type.clone(),
                role: self.state.config.role,
            })
        }
    }

    async fn send_logon(&self, counterparty: &PartyKey) -> Result<(), SessionError> {
        let logon = Logon {
            guardians: self.state.config.own_guardians.clone(),
            heartbeat_interval: self.state.config.heartbeat_interval_secs,
        };
        let own = self.state.own_key;
        self.state
            .enqueue(&self.egress, counterparty, Destination::User, |seq| {
                logon.into_message(own, *counterparty, seq)
            })
            .await?;
        Ok(())
    }

    /// `PPMH`: the solver ships its template.
    async fn on_template_request(&self, message: &Message) -> Result<(), SessionError> {
        let counterparty = message.header.sender;
        let msg_type = message.msg_type();
        self.with_session(&counterparty, |s| s.expect_phase(SessionPhase::Init, msg_type))?;
        self.expect_role(PartyRole::Solver, msg_type)?;
        let template = self
            .state
            .handler
            .template_for(&counterparty)
            .ok_or_else(|| SessionError::WrongRole {
                msg_type: msg_type.clone(),
                role: self.state.config.role,
            })?;

        self.with_session(&counterparty, |s| {
            s.template = Some(template.clone());
            self.advance(s, msg_type)
        })?;

        let own = self.state.own_key;
        self.state
            .enqueue(&self.egress, &counterparty, Destination::User, |seq| {
                Message::new(MsgType::PpmTemplateResponse, own, counterparty, seq)
                    .with_field(FIELD_TEMPLATE, &template)
            })
            .await?;
        Ok(())
    }

    /// `PPMT`: the trader accepts the template and logs on.
    async fn on_template_response(&self, message: &Message) -> Result<(), SessionError> {
        let counterparty = message.header.sender;
        let msg_type = message.msg_type();
        self.with_session(&counterparty, |s| s.expect_phase(SessionPhase::Init, msg_type))?;
        self.expect_role(PartyRole::Trader, msg_type)?;
        let template: PpmTemplate = message.field(FIELD_TEMPLATE)?;
        self.state.handler.on_template(&counterparty, &template)?;

        self.with_session(&counterparty, |s| {
            s.template = Some(template);
            s.logon_sent = true;
            self.advance(s, msg_type)
        })?;
        self.send_logon(&counterparty).await
    }

    /// `A`: connect the counterparty's guardians, render the PPM, enter `TRADE`.
    async fn on_logon(&self, message: &Message) -> Result<(), SessionError> {
        let counterparty = message.header.sender;
        let msg_type = message.msg_type();
        self.with_session(&counterparty, |s| s.expect_phase(SessionPhase::PkXchg, msg_type))?;
        let logon = Logon::from_message(message)?;
        let max = self.state.config.max_heartbeat_secs;
        if logon.heartbeat_interval == 0 || logon.heartbeat_interval > max {
            return Err(MessageError::InvalidField {
                field: FIELD_HEARTBEAT,
                reason: format!("must be between 1 and {max} seconds"),
            }
            .into());
        }
        self.state.handler.on_logon(&counterparty, &logon)?;

        let links = self.state.mesh.connect_all(&logon.guardians).await;

        let reply = self.with_session(&counterparty, |s| {
            s.expect_phase(SessionPhase::PkXchg, msg_type)?;
            s.counterparty_guardians = logon.guardians.clone();
            s.set_counterparty_heartbeat(
                Duration::from_secs(logon.heartbeat_interval),
                Instant::now(),
            );
            for (guardian, link) in links {
                self.state.emit(EngineEvent::GuardianConnected {
                    counterparty: Some(counterparty),
                    guardian,
                });
                s.guardian_links.insert(guardian, link);
            }
            self.render(s);
            let reply = !s.logon_sent;
            s.logon_sent = true;
            self.advance(s, msg_type)?;
            Ok(reply)
        })?;

        if reply {
            self.send_logon(&counterparty).await?;
        }
        Ok(())
    }

    fn render(&self, session: &mut Session) {
        let counterparty = session.counterparty();
        let Some(template) = session.template.as_ref() else {
            warn!(counterparty = %counterparty.short(), "No template, session has no policy");
            return;
        };
        let rendered = template.render_for_session(&self.state.session_keys(session));
        let unresolved = rendered.unresolved().count();
        session.tree = match rendered.build_tree() {
            Ok(tree) => {
                info!(
                    counterparty = %counterparty.short(),
                    root = %hex::encode(tree.root()),
                    leaves = tree.len(),
                    unresolved,
                    "PPM rendered"
                );
                Some(tree)
            }
            Err(e) => {
                warn!(counterparty = %counterparty.short(), error = %e, "PPM has no usable leaves");
                None
            }
        };
        session.rendered = Some(rendered);
    }

    fn on_heartbeat(&self, message: &Message) -> Result<(), SessionError> {
        self.with_session(&message.header.sender, |s| {
            s.expect_phase(SessionPhase::Trade, message.msg_type())
        })?;
        debug!(counterparty = %message.header.sender.short(), seq = message.header.seq_num, "Heartbeat");
        Ok(())
    }

    fn on_ack(&self, message: &Message) {
        debug!(
            counterparty = %message.header.sender.short(),
            ref_msg_type = ?message.optional_field::<String>(FIELD_REF_MSG_TYPE).ok().flatten(),
            ref_seq = ?message.optional_field::<u64>(FIELD_REF_SEQ_NUM).ok().flatten(),
            "Counterparty ack"
        );
    }

    fn on_reject(&self, message: &Message) {
        warn!(
            counterparty = %message.header.sender.short(),
            ref_msg_type = ?message.optional_field::<String>(FIELD_REF_MSG_TYPE).ok().flatten(),
            ref_seq = ?message.optional_field::<u64>(FIELD_REF_SEQ_NUM).ok().flatten(),
            text = ?message.optional_field::<String>(FIELD_TEXT).ok().flatten(),
            "Counterparty rejected our message"
        );
    }

    fn on_guardian_ack(&self, message: &Message) {
        let guardian = message.header.sender;
        match message.field::<u64>(FIELD_REF_SEQ_NUM) {
            Ok(ref_seq_num) => {
                debug!(guardian = %guardian.short(), ref_seq_num, "Guardian ack");
                self.state.emit(EngineEvent::GuardianAck {
                    guardian,
                    ref_seq_num,
                });
            }
            Err(e) => warn!(guardian = %guardian.short(), error = %e, "Malformed guardian ack"),
        }
    }

    /// `PPMA`: authorize against the anchored root, ack, forward for settlement.
    async fn on_custody_action(&self, message: &Message) -> Result<(), SessionError> {
        let counterparty = message.header.sender;
        self.with_session(&counterparty, |s| {
            s.expect_phase(SessionPhase::Trade, message.msg_type())
        })?;
        let custody_id = message
            .header
            .custody_id
            .clone()
            .ok_or(MessageError::MissingField("CustodyID"))?;
        let request: ActionRequest = message.field(FIELD_ACTION)?;
        let anchored = self
            .state
            .anchor
            .anchored(&custody_id)
            .await
            .ok_or_else(|| SessionError::NoAnchoredRoot(custody_id.clone()))?;
        if request.custody_state != anchored.state {
            return Err(SessionError::CustodyStateMismatch {
                custody_id,
                anchored: anchored.state,
                requested: request.custody_state,
            });
        }

        let authorized = self.with_session(&counterparty, |s| {
            let tree = s.tree().ok_or(SessionError::NoPolicy)?;
            Ok(authorize(tree, &request, &anchored.root)?)
        })?;
        self.state.consumed_actions.consume(&authorized.digest)?;

        info!(
            counterparty = %counterparty.short(),
            action = %request.action_type,
            leaf = authorized.leaf_index,
            "Custody action authorized"
        );
        self.state.emit(EngineEvent::ActionAuthorized {
            counterparty,
            leaf_index: authorized.leaf_index,
            leaf_hash: authorized.leaf_hash,
        });

        let own = self.state.own_key;
        self.state
            .enqueue(&self.egress, &counterparty, Destination::User, |seq| {
                ack(message, own, counterparty, seq)
            })
            .await?;

        let proof: Vec<String> = authorized
            .proof
            .iter()
            .map(|h| format!("0x{}", hex::encode(h)))
            .collect();
        self.state
            .enqueue(&self.egress, &counterparty, Destination::Blockchain, |seq| {
                Message::new(MsgType::CustodyAction, own, counterparty, seq)
                    .with_custody_id(custody_id)
                    .with_field(FIELD_ACTION, &request)
                    .with_field(FIELD_LEAF_INDEX, authorized.leaf_index)
                    .with_field(FIELD_LEAF_HASH, format!("0x{}", hex::encode(authorized.leaf_hash)))
                    .with_field(FIELD_PROOF, proof)
            })
            .await?;
        Ok(())
    }

    /// Opaque trade traffic goes downstream untouched.
    async fn on_trade(&self, message: &Message, link: PeerLink) -> Result<(), SessionError> {
        let counterparty = message.header.sender;
        self.with_session(&counterparty, |s| {
            s.expect_phase(SessionPhase::Trade, message.msg_type())
        })?;
        let destination = self.state.handler.on_trade(&counterparty, message);
        debug!(counterparty = %counterparty.short(), msg_type = %message.msg_type(), ?destination, "Trade message forwarded");
        self.egress
            .send(Outbound::new(counterparty, link, message.clone(), destination))
            .await
            .map_err(|_| SessionError::QueueClosed("egress"))
    }

    async fn reject(&self, message: &Message, error: SessionError) -> Result<(), StageError> {
        let counterparty = message.header.sender;
        warn!(
            counterparty = %counterparty.short(),
            msg_type = %message.msg_type(),
            seq = message.header.seq_num,
            kind = %error.kind(),
            error = %error,
            "Rejecting message"
        );
        self.state.emit(EngineEvent::MessageRejected {
            counterparty,
            msg_type: message.msg_type().as_str().to_string(),
            reason: error.to_string(),
        });
        let sent = self
            .state
            .enqueue(&self.egress, &counterparty, Destination::User, |seq| {
                business_reject(message, seq, &error)
            })
            .await;
        match sent {
            Ok(_) => Ok(()),
            Err(SessionError::QueueClosed(queue)) => Err(StageError::QueueClosed(queue)),
            Err(e) => {
                debug!(error = %e, "Reject not sent");
                Ok(())
            }
        }
    }
}
