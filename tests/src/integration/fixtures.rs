//! Shared setup: a solver template and in-memory trader/solver engines.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ps_01_signature::KeyPair;
use ps_02_ppm::{LeafTemplate, PartyRef, PpmTemplate};
use ps_03_guardian_mesh::{GuardianMesh, GuardianRecord, InMemoryGuardianConnector, StaticPartyRegistry};
use ps_04_session_engine::testing::link_pair;
use ps_04_session_engine::{
    Engine, EngineBuilder, EngineConfig, InMemoryCustodyAnchor, TemplateHandler,
};
use serde_json::{json, Value};
use shared_bus::PeerLink;
use shared_types::{PartyKey, PartyRole, SessionPhase};
use tokio::sync::mpsc;

pub const CHAIN_ID: u64 = 56;
pub const CUSTODY_STATE: u8 = 0;
pub const CUSTODY_CONTRACT: [u8; 20] = [0x42; 20];
pub const REGISTRY: &str = "0xregistry";
pub const WAIT: Duration = Duration::from_secs(30);

pub fn receiver_args() -> Value {
    json!({ "receiver": format!("0x{}", "ab".repeat(20)) })
}

fn leaf(party: PartyRef, action: &str, args: Value) -> LeafTemplate {
    LeafTemplate {
        action_type: action.into(),
        chain_id: CHAIN_ID,
        custody_contract: CUSTODY_CONTRACT,
        custody_state: CUSTODY_STATE,
        party,
        args,
        signers: None,
        attestations: BTreeMap::new(),
    }
}

/// The solver's policy:
///
/// 0. the trader may withdraw to one receiver
/// 1. both parties together may replace the PPM
/// 2. the solver's first guardian may move the custody to state 1
pub fn solver_template() -> PpmTemplate {
    PpmTemplate {
        leaves: vec![
            leaf(
                PartyRef::role(PartyRole::Trader),
                "custodyToAddress",
                receiver_args(),
            ),
            leaf(
                PartyRef::multisig(vec![
                    PartyRef::role(PartyRole::Trader),
                    PartyRef::role(PartyRole::Solver),
                ]),
                "updatePPM",
                Value::Null,
            ),
            leaf(
                PartyRef::guardian(PartyRole::Solver, 0),
                "changeCustodyState",
                json!({ "newState": 1 }),
            ),
        ],
    }
}

pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out")
}

pub async fn wait_for_phase(engine: &Engine, counterparty: &PartyKey, phase: SessionPhase) {
    within(async {
        while engine.session(counterparty).map(|s| s.phase) != Some(phase) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

pub struct Party {
    pub engine: Engine,
    pub key: KeyPair,
    pub guardian: KeyPair,
    pub guardian_rx: mpsc::Receiver<Vec<u8>>,
}

/// Two engines sharing an in-memory registry, connector and custody anchor.
pub struct Pair {
    pub trader: Party,
    pub solver: Party,
    pub anchor: Arc<InMemoryCustodyAnchor>,
}

impl Pair {
    pub async fn start() -> Self {
        let registry = Arc::new(StaticPartyRegistry::default());
        let connector = Arc::new(InMemoryGuardianConnector::new());
        let anchor = Arc::new(InMemoryCustodyAnchor::new());
        let trader = party(PartyRole::Trader, &registry, &connector, &anchor).await;
        let solver = party(PartyRole::Solver, &registry, &connector, &anchor).await;
        Self {
            trader,
            solver,
            anchor,
        }
    }

    /// Trader opens the session; both sides reach TRADE.
    pub async fn handshake(&self) {
        let (to_solver, _to_trader) = link_pair(
            self.trader.engine.ingress_sender(),
            self.solver.engine.ingress_sender(),
            64,
        );
        self.trader
            .engine
            .connect(self.solver.key.party_key(), to_solver)
            .await
            .unwrap();
        wait_for_phase(&self.trader.engine, &self.solver.key.party_key(), SessionPhase::Trade).await;
        wait_for_phase(&self.solver.engine, &self.trader.key.party_key(), SessionPhase::Trade).await;
    }

    /// Anchor the solver-side root for `custody_id`, as the custody contract would.
    pub fn anchor_root(&self, custody_id: &str) {
        let root = self
            .solver
            .engine
            .session(&self.trader.key.party_key())
            .and_then(|s| s.ppm_root)
            .expect("no PPM root");
        self.anchor.anchor(custody_id, root);
    }
}

async fn party(
    role: PartyRole,
    registry: &Arc<StaticPartyRegistry>,
    connector: &Arc<InMemoryGuardianConnector>,
    anchor: &Arc<InMemoryCustodyAnchor>,
) -> Party {
    let key = KeyPair::generate();
    let guardian = KeyPair::generate();
    let address = format!("guardian-{}", guardian.party_key());
    registry.append(GuardianRecord {
        public_key: guardian.party_key(),
        ip_address: address.clone(),
        block_number: 1,
    });
    let (link, guardian_rx) = PeerLink::channel(4096);
    connector.register(address, link);

    let mut config = EngineConfig::new(role, vec![guardian.party_key()]);
    config.heartbeat_interval_secs = 5;
    let handler = match role {
        PartyRole::Solver => TemplateHandler::serving(solver_template()),
        PartyRole::Trader => TemplateHandler::new(),
    };
    let mesh = GuardianMesh::new(registry.clone(), connector.clone(), REGISTRY);
    let engine = EngineBuilder::new(config, Arc::new(key.clone()), mesh)
        .handler(Arc::new(handler))
        .anchor(anchor.clone())
        .start()
        .await
        .unwrap();
    Party {
        engine,
        key,
        guardian,
        guardian_rx,
    }
}
