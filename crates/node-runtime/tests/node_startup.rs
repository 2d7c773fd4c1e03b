//! Node startup against real sockets.

use ps_01_signature::KeyPair;
use ps_03_guardian_mesh::GuardianRecord;
use psymm_node::config::PRIVATE_KEY_VAR;
use psymm_node::{NodeConfig, NodeRuntime};
use shared_types::PartyRole;
use tokio::net::{TcpListener, TcpStream};

const SECRET: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

fn config_with_guardian(guardian: &KeyPair, guardian_addr: String) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.role = PartyRole::Solver;
    config.listen_addr = "127.0.0.1:0".to_string();
    config.own_guardians = vec![guardian.party_key()];
    config.registry = vec![GuardianRecord {
        public_key: guardian.party_key(),
        ip_address: guardian_addr,
        block_number: 1,
    }];
    config
        .apply_env(|var| (var == PRIVATE_KEY_VAR).then(|| SECRET.to_string()))
        .unwrap();
    config
}

#[tokio::test]
async fn test_node_starts_with_reachable_guardian() {
    let guardian_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let guardian_addr = guardian_listener.local_addr().unwrap().to_string();
    let guardian_side = tokio::spawn(async move { guardian_listener.accept().await.map(|(s, _)| s) });
    let guardian = KeyPair::generate();

    let runtime = NodeRuntime::start(config_with_guardian(&guardian, guardian_addr))
        .await
        .unwrap();
    assert!(runtime.engine().own_guardian_connected());
    assert_ne!(runtime.local_addr().port(), 0);
    let _guardian_stream = guardian_side.await.unwrap().unwrap();

    // The accept loop is up.
    TcpStream::connect(runtime.local_addr()).await.unwrap();
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_node_refuses_to_start_without_own_guardian() {
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = closed.local_addr().unwrap().to_string();
    drop(closed);

    let err = NodeRuntime::start(config_with_guardian(&KeyPair::generate(), dead_addr))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Failed to start session engine"));
}
