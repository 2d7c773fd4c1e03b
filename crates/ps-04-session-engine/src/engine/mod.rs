//! # Session Engine
//!
//! Owns the session map and runs the pipeline as one supervised task per
//! stage:
//!
//! ```text
//! InboundFrame ─→ [ingress] ─→ [sequencing] ─→ [egress] ─┬─→ [guardian egress] ─→ counterparty, mesh, own guardian
//!                                   [heartbeat] ──┘       └─→ blockchain / exchange receivers
//! ```
//!
//! Dropping or shutting down the engine aborts every stage.

mod egress;
mod heartbeat;
mod ingress;
mod sequencing;
mod state;


use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use ps_01_signature::{ConsumedNonceRegistry, MessageSigner};
use ps_02_ppm::{ActionRequest, PpmTree};
use ps_03_guardian_mesh::GuardianMesh;
use shared_bus::{
    supervise, supervise_interval, EngineEvent, EventFilter, EventStream, InMemoryEventBus,
    InboundFrame, PeerLink, Subscription,
};
use shared_types::{Hash, Message, MsgType, PartyKey, PartyRole, SessionPhase};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

use crate::adapters::anchor::InMemoryCustodyAnchor;
use crate::config::EngineConfig;
use crate::domain::errors::SessionError;
use crate::domain::routing::{Destination, Outbound};
use crate::domain::session::Session;
use crate::domain::wire::FIELD_ACTION;
use crate::ports::inbound::{SessionHandler, TemplateHandler};
use crate::ports::outbound::CustodyAnchor;

use self::egress::{EgressStage, GuardianEgressStage};
use self::heartbeat::HeartbeatStage;
use self::ingress::IngressStage;
use self::sequencing::SequencingStage;
use self::state::EngineState;

/// Receivers of the downstream execution queues.
#[derive(Debug)]
pub struct Downstream {
    pub blockchain: mpsc::Receiver<Message>,
    pub exchange: mpsc::Receiver<Message>,
}

/// Read-only view of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub counterparty: PartyKey,
    pub phase: SessionPhase,
    pub last_sent_seq: u64,
    pub counterparty_guardians: Vec<PartyKey>,
    pub connected_guardians: Vec<PartyKey>,
    /// Root of the rendered PPM, once built.
    pub ppm_root: Option<Hash>,
    /// Rendered leaves whose references did not resolve.
    pub unresolved_leaves: Vec<usize>,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            counterparty: session.counterparty(),
            phase: session.phase(),
            last_sent_seq: session.last_sent_seq(),
            counterparty_guardians: session.counterparty_guardians().to_vec(),
            connected_guardians: session.connected_guardians(),
            ppm_root: session.tree().map(|t| t.root()),
            unresolved_leaves: session
                .rendered()
                .map(|r| r.unresolved().map(|l| l.index).collect())
                .unwrap_or_default(),
        }
    }
}

/// Collects the engine's collaborators.
pub struct EngineBuilder {
    config: EngineConfig,
    signer: Arc<dyn MessageSigner>,
    mesh: GuardianMesh,
    handler: Arc<dyn SessionHandler>,
    anchor: Arc<dyn CustodyAnchor>,
    events: Arc<InMemoryEventBus>,
    ingress: Option<(mpsc::Sender<InboundFrame>, mpsc::Receiver<InboundFrame>)>,
}

impl EngineBuilder {
    #[must_use]
    pub fn new(config: EngineConfig, signer: Arc<dyn MessageSigner>, mesh: GuardianMesh) -> Self {
        let capacity = config.queue_capacity;
        Self {
            config,
            signer,
            mesh,
            handler: Arc::new(TemplateHandler::new()),
            anchor: Arc::new(InMemoryCustodyAnchor::new()),
            events: Arc::new(InMemoryEventBus::with_capacity(capacity)),
            ingress: None,
        }
    }

    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn SessionHandler>) -> Self {
        self.handler = handler;
        self
    }

    #[must_use]
    pub fn anchor(mut self, anchor: Arc<dyn CustodyAnchor>) -> Self {
        self.anchor = anchor;
        self
    }

    #[must_use]
    pub fn event_bus(mut self, events: Arc<InMemoryEventBus>) -> Self {
        self.events = events;
        self
    }

    /// Use an existing ingress queue.
    ///
    /// Transports built before the engine (such as the guardian connector)
    /// hold senders of this queue.
    #[must_use]
    pub fn ingress(
        mut self,
        sender: mpsc::Sender<InboundFrame>,
        receiver: mpsc::Receiver<InboundFrame>,
    ) -> Self {
        self.ingress = Some((sender, receiver));
        self
    }

    /// Link the own guardian, then spawn every stage.
    ///
    /// # Errors
    ///
    /// `NoOwnGuardian` / `Mesh(OwnGuardianUnavailable)` when the own guardian
    /// link cannot be established; nothing is spawned in that case.
    pub async fn start(self) -> Result<Engine, SessionError> {
        let guardian = self
            .config
            .startup_guardian()
            .ok_or(SessionError::NoOwnGuardian)?;
        let guardian_link = self.mesh.connect_own(guardian).await?;
        self.events.emit(EngineEvent::GuardianConnected {
            counterparty: None,
            guardian,
        });

        let capacity = self.config.queue_capacity;
        let backoff = self.config.restart_backoff();
        let tick = self.config.heartbeat_tick();
        let own_key = self.signer.party_key();

        let state = Arc::new(EngineState {
            config: self.config,
            own_key,
            signer: self.signer,
            handler: self.handler,
            mesh: self.mesh,
            anchor: self.anchor,
            events: self.events,
            sessions: RwLock::new(HashMap::new()),
            own_guardian: RwLock::new(Some((guardian, guardian_link))),
            consumed_actions: ConsumedNonceRegistry::new(),
        });

        let (ingress_tx, ingress_rx) = self
            .ingress
            .unwrap_or_else(|| mpsc::channel(capacity));
        let (sequencing_tx, sequencing_rx) = mpsc::channel(capacity);
        let (egress_tx, egress_rx) = mpsc::channel(capacity);
        let (guardian_tx, guardian_rx) = mpsc::channel(capacity);
        let (blockchain_tx, blockchain_rx) = mpsc::channel(capacity);
        let (exchange_tx, exchange_rx) = mpsc::channel(capacity);

        let ingress = IngressStage {
            state: state.clone(),
            sequencing: sequencing_tx,
        };
        let sequencing = SequencingStage {
            state: state.clone(),
            egress: egress_tx.clone(),
        };
        let egress = EgressStage {
            state: state.clone(),
            guardian: guardian_tx,
            blockchain: blockchain_tx,
            exchange: exchange_tx,
        };
        let guardian_egress = GuardianEgressStage {
            state: state.clone(),
        };
        let heartbeat = HeartbeatStage {
            state: state.clone(),
            egress: egress_tx.clone(),
        };

        let tasks = vec![
            tokio::spawn(async move {
                supervise(ingress, ingress_rx, backoff).await;
            }),
            tokio::spawn(async move {
                supervise(sequencing, sequencing_rx, backoff).await;
            }),
            tokio::spawn(async move {
                supervise(egress, egress_rx, backoff).await;
            }),
            tokio::spawn(async move {
                supervise(guardian_egress, guardian_rx, backoff).await;
            }),
            tokio::spawn(supervise_interval(heartbeat, tick, backoff)),
        ];

        info!(
            key = %own_key.short(),
            role = %state.config.role,
            guardian = %guardian.short(),
            "Session engine started"
        );

        Ok(Engine {
            state,
            ingress: ingress_tx,
            egress: egress_tx,
            downstream: Mutex::new(Some(Downstream {
                blockchain: blockchain_rx,
                exchange: exchange_rx,
            })),
            tasks,
        })
    }
}

/// A running session engine.
pub struct Engine {
    state: Arc<EngineState>,
    ingress: mpsc::Sender<InboundFrame>,
    egress: mpsc::Sender<Outbound>,
    downstream: Mutex<Option<Downstream>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// This party's key.
    #[must_use]
    pub fn own_key(&self) -> PartyKey {
        self.state.own_key
    }

    #[must_use]
    pub fn role(&self) -> PartyRole {
        self.state.config.role
    }

    /// Queue transports feed received frames into.
    #[must_use]
    pub fn ingress_sender(&self) -> mpsc::Sender<InboundFrame> {
        self.ingress.clone()
    }

    /// Subscribe to engine events.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.state.events.subscribe(filter)
    }

    /// Engine events as a `Stream`.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        self.state.events.event_stream(filter)
    }

    /// Downstream receivers. Available once.
    pub fn take_downstream(&self) -> Option<Downstream> {
        self.downstream.lock().take()
    }

    /// Open a session with `counterparty` over `link` and request its template.
    ///
    /// # Errors
    ///
    /// - `WrongRole` unless this party is the trader
    /// - `SessionExists` if a session with `counterparty` is open
    pub async fn connect(&self, counterparty: PartyKey, link: PeerLink) -> Result<(), SessionError> {
        if self.state.config.role != PartyRole::Trader {
            return Err(SessionError::WrongRole {
                msg_type: MsgType::PpmTemplateRequest,
                role: self.state.config.role,
            });
        }
        {
            let mut sessions = self.state.sessions.write();
            if sessions.contains_key(&counterparty) {
                return Err(SessionError::SessionExists(counterparty));
            }
            sessions.insert(
                counterparty,
                Session::new(
                    counterparty,
                    link,
                    self.state.config.heartbeat_interval(),
                    Instant::now(),
                ),
            );
        }
        info!(counterparty = %counterparty.short(), "Session opened, requesting template");

        let own = self.state.own_key;
        self.state
            .enqueue(&self.egress, &counterparty, Destination::User, |seq| {
                Message::new(MsgType::PpmTemplateRequest, own, counterparty, seq)
            })
            .await?;
        Ok(())
    }

    /// Send a logout and tear the session down.
    ///
    /// Returns `false` if there was no session.
    pub async fn disconnect(&self, counterparty: &PartyKey) -> Result<bool, SessionError> {
        let own = self.state.own_key;
        match self
            .state
            .enqueue(&self.egress, counterparty, Destination::User, |seq| {
                Message::new(MsgType::Logout, own, *counterparty, seq)
            })
            .await
        {
            Ok(_) => {}
            Err(SessionError::UnknownSession(_)) => return Ok(false),
            Err(e) => return Err(e),
        }
        Ok(self.state.teardown(counterparty, "local disconnect"))
    }

    /// Queue a message for `counterparty` under the session's next sequence
    /// number. `None` routes through the guardian mesh.
    pub async fn send(
        &self,
        counterparty: &PartyKey,
        msg_type: MsgType,
        body: serde_json::Map<String, serde_json::Value>,
        destination: Option<Destination>,
    ) -> Result<u64, SessionError> {
        let own = self.state.own_key;
        self.state
            .enqueue(
                &self.egress,
                counterparty,
                destination.unwrap_or_default(),
                |seq| {
                    let mut message = Message::new(msg_type, own, *counterparty, seq);
                    message.body = body;
                    message
                },
            )
            .await
    }

    /// Send a custody action (`PPMA`) for `custody_id` to `counterparty`.
    ///
    /// An unsigned request is signed here with this party's key over the
    /// matching leaf of the session's PPM.
    pub async fn submit_action(
        &self,
        counterparty: &PartyKey,
        custody_id: &str,
        request: ActionRequest,
    ) -> Result<u64, SessionError> {
        let request = if request.signature.is_some() {
            request
        } else {
            self.with_tree(counterparty, |tree| {
                Ok(request.sign_single(tree, self.state.signer.as_ref())?)
            })?
        };

        let own = self.state.own_key;
        self.state
            .enqueue(&self.egress, counterparty, Destination::Guardian, |seq| {
                Message::new(MsgType::CustodyAction, own, *counterparty, seq)
                    .with_custody_id(custody_id)
                    .with_field(FIELD_ACTION, &request)
            })
            .await
    }

    /// Digest every signer of `request` signs, under the session's PPM.
    ///
    /// Multi-party requests are signed out of band over this digest and
    /// submitted with the combined signature attached.
    pub fn action_digest(
        &self,
        counterparty: &PartyKey,
        request: &ActionRequest,
    ) -> Result<Hash, SessionError> {
        self.with_tree(counterparty, |tree| Ok(request.signing_digest(tree)?))
    }

    fn with_tree<R>(
        &self,
        counterparty: &PartyKey,
        f: impl FnOnce(&PpmTree) -> Result<R, SessionError>,
    ) -> Result<R, SessionError> {
        let sessions = self.state.sessions.read();
        let session = sessions
            .get(counterparty)
            .ok_or(SessionError::UnknownSession(*counterparty))?;
        f(session.tree().ok_or(SessionError::NoPolicy)?)
    }

    /// Snapshot of the session with `counterparty`.
    #[must_use]
    pub fn session(&self, counterparty: &PartyKey) -> Option<SessionSnapshot> {
        self.state
            .sessions
            .read()
            .get(counterparty)
            .map(SessionSnapshot::from)
    }

    /// Counterparties with a live session.
    #[must_use]
    pub fn sessions(&self) -> Vec<PartyKey> {
        let mut keys: Vec<PartyKey> = self.state.sessions.read().keys().copied().collect();
        keys.sort();
        keys
    }

    /// Whether the own guardian link is still up.
    #[must_use]
    pub fn own_guardian_connected(&self) -> bool {
        self.state.own_guardian.read().is_some()
    }

    /// Stop every stage and drop all sessions.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        for counterparty in self.sessions() {
            self.state.teardown(&counterparty, "shutdown");
        }
        info!(key = %self.state.own_key.short(), "Session engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("own_key", &self.state.own_key)
            .field("role", &self.state.config.role)
            .field("sessions", &self.state.sessions.read().len())
            .finish_non_exhaustive()
    }
}
