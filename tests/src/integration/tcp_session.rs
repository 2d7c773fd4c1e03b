//! # Session over TCP
//!
//! Trader A (guardian g1) and solver B (guardian g2) run full engines wired
//! to real sockets. Guardians are line-oriented TCP listeners that ACK every
//! heartbeat they witness from the party they serve.
//!
//! Checks: both sides reach TRADE with the same PPM root, g1 witnesses A's
//! heartbeats with strictly increasing MsgSeqNum, g1 also witnesses B's
//! traffic once B has joined A's mesh, and A receives g1's ACKs.

use std::sync::Arc;
use std::time::Duration;

use ps_01_signature::KeyPair;
use ps_03_guardian_mesh::{
    serve, spawn_connection, GuardianMesh, GuardianRecord, StaticPartyRegistry,
    TcpGuardianConnector,
};
use ps_04_session_engine::{ack, sign_once, Engine, EngineBuilder, EngineConfig, TemplateHandler};
use shared_bus::{EngineEvent, EventFilter, EventTopic};
use shared_types::{Message, MsgType, PartyKey, PartyRole, SessionPhase};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use super::fixtures::{solver_template, wait_for_phase, within, REGISTRY};

const CAPACITY: usize = 256;

/// A guardian that reports what it witnesses and ACKs heartbeats from `serves`.
async fn spawn_guardian(key: KeyPair, serves: PartyKey) -> (String, mpsc::UnboundedReceiver<Message>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let (witnessed_tx, witnessed_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let key = key.clone();
            let witnessed = witnessed_tx.clone();
            tokio::spawn(async move {
                let (read, mut write) = stream.into_split();
                let mut lines = BufReader::new(read).lines();
                let mut seq = 0;
                while let Ok(Some(line)) = lines.next_line().await {
                    let Ok(message) = Message::from_wire(line.as_bytes()) else {
                        continue;
                    };
                    if message.header.sender == serves && *message.msg_type() == MsgType::Heartbeat {
                        seq += 1;
                        let reply = ack(&message, key.party_key(), serves, seq);
                        let mut bytes = sign_once(reply, &key).unwrap().to_wire().unwrap();
                        bytes.push(b'\n');
                        if write.write_all(&bytes).await.is_err() {
                            break;
                        }
                    }
                    if witnessed.send(message).is_err() {
                        break;
                    }
                }
            });
        }
    });
    (address, witnessed_rx)
}

async fn start_node(
    role: PartyRole,
    key: &KeyPair,
    guardian: PartyKey,
    registry: Arc<StaticPartyRegistry>,
) -> Engine {
    let (ingress_tx, ingress_rx) = mpsc::channel(CAPACITY);
    let connector = Arc::new(TcpGuardianConnector::new(ingress_tx.clone(), CAPACITY));
    let mut config = EngineConfig::new(role, vec![guardian]);
    config.heartbeat_interval_secs = 1;
    config.queue_capacity = CAPACITY;
    let handler = match role {
        PartyRole::Solver => TemplateHandler::serving(solver_template()),
        PartyRole::Trader => TemplateHandler::new(),
    };
    EngineBuilder::new(
        config,
        Arc::new(key.clone()),
        GuardianMesh::new(registry, connector, REGISTRY),
    )
    .ingress(ingress_tx, ingress_rx)
    .handler(Arc::new(handler))
    .start()
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_trader_and_solver_over_tcp() {
    let (a, b) = (KeyPair::generate(), KeyPair::generate());
    let (g1, g2) = (KeyPair::generate(), KeyPair::generate());
    let (g1_addr, mut g1_witnessed) = spawn_guardian(g1.clone(), a.party_key()).await;
    let (g2_addr, _g2_witnessed) = spawn_guardian(g2.clone(), b.party_key()).await;

    let registry = Arc::new(StaticPartyRegistry::new(vec![
        GuardianRecord {
            public_key: g1.party_key(),
            ip_address: g1_addr,
            block_number: 1,
        },
        GuardianRecord {
            public_key: g2.party_key(),
            ip_address: g2_addr,
            block_number: 1,
        },
    ]));

    let trader = start_node(PartyRole::Trader, &a, g1.party_key(), registry.clone()).await;
    let solver = start_node(PartyRole::Solver, &b, g2.party_key(), registry).await;
    let mut acks = trader.subscribe(EventFilter::topics(vec![EventTopic::Guardian]));

    // B listens, A dials.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let solver_addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let accept = tokio::spawn(serve(listener, solver.ingress_sender(), CAPACITY, shutdown_rx));
    let stream = TcpStream::connect(solver_addr).await.unwrap();
    let link = spawn_connection(stream, trader.ingress_sender(), CAPACITY);
    trader.connect(b.party_key(), link).await.unwrap();

    wait_for_phase(&trader, &b.party_key(), SessionPhase::Trade).await;
    wait_for_phase(&solver, &a.party_key(), SessionPhase::Trade).await;
    let on_a = trader.session(&b.party_key()).unwrap();
    let on_b = solver.session(&a.party_key()).unwrap();
    assert!(on_a.ppm_root.is_some());
    assert_eq!(on_a.ppm_root, on_b.ppm_root);
    assert_eq!(on_b.connected_guardians, vec![g1.party_key()]);

    // g1 sees A's heartbeats in order, and B's traffic through B's mesh.
    let mut heartbeats = Vec::new();
    let mut saw_solver = false;
    within(async {
        while heartbeats.len() < 3 || !saw_solver {
            let message = g1_witnessed.recv().await.unwrap();
            if message.header.sender == b.party_key() {
                saw_solver = true;
            } else if *message.msg_type() == MsgType::Heartbeat {
                heartbeats.push(message.header.seq_num);
            }
        }
    })
    .await;
    assert!(heartbeats.windows(2).all(|w| w[1] > w[0]), "{heartbeats:?}");
    assert!(heartbeats[0] > 2);

    // g1's ACKs come back over the guardian link.
    within(async {
        loop {
            if let Some(EngineEvent::GuardianAck { guardian, .. }) = acks.recv().await {
                assert_eq!(guardian, g1.party_key());
                break;
            }
        }
    })
    .await;

    shutdown_tx.send(true).unwrap();
    accept.await.unwrap();
    assert!(trader.disconnect(&b.party_key()).await.unwrap());
    tokio::time::sleep(Duration::from_millis(50)).await;
}
