//! Engine-owned state shared by the stage tasks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use ps_01_signature::{ConsumedNonceRegistry, MessageSigner};
use ps_02_ppm::SessionKeys;
use ps_03_guardian_mesh::GuardianMesh;
use shared_bus::{EngineEvent, InMemoryEventBus, PeerLink};
use shared_types::{Message, PartyKey};
use tokio::sync::mpsc;
use tracing::info;

use crate::config::EngineConfig;
use crate::domain::errors::SessionError;
use crate::domain::routing::{Destination, Outbound};
use crate::domain::session::Session;
use crate::domain::wire::sign_once;
use crate::ports::inbound::SessionHandler;
use crate::ports::outbound::CustodyAnchor;

pub(crate) struct EngineState {
    pub config: EngineConfig,
    pub own_key: PartyKey,
    pub signer: Arc<dyn MessageSigner>,
    pub handler: Arc<dyn SessionHandler>,
    pub mesh: GuardianMesh,
    pub anchor: Arc<dyn CustodyAnchor>,
    pub events: Arc<InMemoryEventBus>,
    pub sessions: RwLock<HashMap<PartyKey, Session>>,
    pub own_guardian: RwLock<Option<(PartyKey, PeerLink)>>,
    /// Digests of authorized custody actions.
    pub consumed_actions: ConsumedNonceRegistry,
}

impl EngineState {
    pub fn emit(&self, event: EngineEvent) {
        self.events.emit(event);
    }

    /// Key material for rendering the PPM of `session`.
    pub fn session_keys(&self, session: &Session) -> SessionKeys {
        SessionKeys {
            own_role: self.config.role,
            own_key: self.own_key,
            own_guardians: self.config.own_guardians.clone(),
            counterparty_key: session.counterparty(),
            counterparty_guardians: session.counterparty_guardians().to_vec(),
        }
    }

    /// Build a message under the session's next sequence number and queue it.
    ///
    /// The sequence number is taken and the item queued under the session
    /// lock, so queue order always matches sequence order.
    pub async fn enqueue(
        &self,
        egress: &mpsc::Sender<Outbound>,
        counterparty: &PartyKey,
        destination: Destination,
        build: impl FnOnce(u64) -> Message,
    ) -> Result<u64, SessionError> {
        let permit = egress
            .reserve()
            .await
            .map_err(|_| SessionError::QueueClosed("egress"))?;
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(counterparty)
            .ok_or(SessionError::UnknownSession(*counterparty))?;
        let seq = session.next_seq();
        permit.send(Outbound::new(
            *counterparty,
            session.link().clone(),
            build(seq),
            destination,
        ));
        Ok(seq)
    }

    /// Sign (once) and encode for the wire.
    pub fn seal(&self, message: Message) -> Result<Vec<u8>, SessionError> {
        let signed = sign_once(message, self.signer.as_ref())?;
        Ok(signed.to_wire()?)
    }

    /// Whether `key` is one of ours or a guardian some counterparty advertised.
    pub fn is_guardian(&self, key: &PartyKey) -> bool {
        self.config.own_guardians.contains(key)
            || self
                .sessions
                .read()
                .values()
                .any(|s| s.counterparty_guardians().contains(key))
    }

    /// Drop the session with `counterparty`, if any.
    pub fn teardown(&self, counterparty: &PartyKey, reason: &str) -> bool {
        let Some(session) = self.sessions.write().remove(counterparty) else {
            return false;
        };
        for guardian in session.connected_guardians() {
            self.emit(EngineEvent::GuardianDropped {
                counterparty: Some(*counterparty),
                guardian,
            });
        }
        info!(
            counterparty = %counterparty.short(),
            phase = %session.phase(),
            reason,
            "Session closed"
        );
        self.emit(EngineEvent::SessionClosed {
            counterparty: *counterparty,
        });
        true
    }
}
