//! # Custody Actions
//!
//! `PPMA` flows from the trader's engine to the solver's, authorized against
//! the anchored PPM root:
//!
//! 1. **Single signer**: the trader withdraws to the allowed receiver
//! 2. **Multi-party**: trader and solver jointly replace the PPM
//! 3. **Guardian**: the solver's guardian changes the custody state
//! 4. **Rejections**: wrong signer set, unanchored custody

use ps_01_signature::{
    aggregate_keys, sign_digest, ConsumedNonceRegistry, KeyPair, MultiSignature, NonceSet,
    SigningSession,
};
use ps_02_ppm::{ActionRequest, ActionSignature, ActionType, PpmTree};
use shared_bus::{EngineEvent, EventFilter, EventTopic, Subscription};
use shared_types::{Hash, Message, MsgType, PartyKey};

use super::fixtures::{receiver_args, within, Pair, CHAIN_ID, CUSTODY_STATE};

fn parse_hash(text: &str) -> Hash {
    hex::decode(text.strip_prefix("0x").unwrap_or(text))
        .unwrap()
        .try_into()
        .unwrap()
}

async fn next_event(sub: &mut Subscription) -> EngineEvent {
    within(sub.recv()).await.unwrap()
}

/// Check the settlement copy carries a proof for the anchored root.
fn assert_settlement(message: &Message, custody_id: &str, root: Hash) {
    assert_eq!(*message.msg_type(), MsgType::CustodyAction);
    assert_eq!(message.header.custody_id.as_deref(), Some(custody_id));
    let leaf_hash = parse_hash(&message.field::<String>("LeafHash").unwrap());
    let proof: Vec<Hash> = message
        .field::<Vec<String>>("Proof")
        .unwrap()
        .iter()
        .map(|h| parse_hash(h))
        .collect();
    assert!(PpmTree::verify_proof(&proof, &leaf_hash, &root));
}

fn solver_root(pair: &Pair) -> Hash {
    pair.solver
        .engine
        .session(&pair.trader.key.party_key())
        .and_then(|s| s.ppm_root)
        .unwrap()
}

fn joint_key(pair: &Pair) -> PartyKey {
    aggregate_keys(&[pair.trader.key.party_key(), pair.solver.key.party_key()])
        .unwrap()
        .party_key()
}

/// Run one multi-party round over `digest` for `signers`.
fn multi_sign(digest: Hash, signers: &[&KeyPair]) -> MultiSignature {
    let registry = ConsumedNonceRegistry::new();
    let keys: Vec<_> = signers.iter().map(|k| k.party_key()).collect();
    let session_id: Hash = rand::random();
    let mut round = SigningSession::new(session_id, digest, &keys, &registry).unwrap();
    let mut nonce_sets: Vec<NonceSet> = signers
        .iter()
        .map(|_| NonceSet::generate(round.session_id(), 2).unwrap())
        .collect();
    for (signer, nonces) in signers.iter().zip(&nonce_sets) {
        round
            .add_nonces(signer.party_key(), nonces.public_nonces().clone())
            .unwrap();
    }
    for (signer, nonces) in signers.iter().zip(nonce_sets.iter_mut()) {
        round.sign(signer, nonces).unwrap();
    }
    round.finish().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_trader_withdrawal_authorized_and_settled() {
    let pair = Pair::start().await;
    let mut downstream = pair.solver.engine.take_downstream().unwrap();
    let mut events = pair
        .solver
        .engine
        .subscribe(EventFilter::topics(vec![EventTopic::Authorization]));
    pair.handshake().await;
    pair.anchor_root("custody-1");

    let request = ActionRequest::new(
        ActionType::CustodyToAddress,
        CHAIN_ID,
        CUSTODY_STATE,
        pair.trader.key.party_key(),
        receiver_args(),
        rand::random(),
    );
    pair.trader
        .engine
        .submit_action(&pair.solver.key.party_key(), "custody-1", request)
        .await
        .unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        EngineEvent::ActionAuthorized { .. }
    ));
    let settlement = within(downstream.blockchain.recv()).await.unwrap();
    assert_settlement(&settlement, "custody-1", solver_root(&pair));
}

#[tokio::test(start_paused = true)]
async fn test_joint_ppm_update_with_combined_signature() {
    let pair = Pair::start().await;
    let mut downstream = pair.solver.engine.take_downstream().unwrap();
    pair.handshake().await;
    pair.anchor_root("custody-2");

    let request = ActionRequest::new(
        ActionType::UpdatePpm,
        CHAIN_ID,
        CUSTODY_STATE,
        joint_key(&pair),
        serde_json::Value::Null,
        7,
    );
    let digest = pair
        .trader
        .engine
        .action_digest(&pair.solver.key.party_key(), &request)
        .unwrap();
    let signature = multi_sign(digest, &[&pair.trader.key, &pair.solver.key]);
    let request = request.with_multi_signature(signature);

    pair.trader
        .engine
        .submit_action(&pair.solver.key.party_key(), "custody-2", request)
        .await
        .unwrap();
    let settlement = within(downstream.blockchain.recv()).await.unwrap();
    assert_settlement(&settlement, "custody-2", solver_root(&pair));
}

#[tokio::test(start_paused = true)]
async fn test_guardian_changes_custody_state() {
    let pair = Pair::start().await;
    let mut downstream = pair.solver.engine.take_downstream().unwrap();
    pair.handshake().await;
    pair.anchor_root("custody-3");

    let request = ActionRequest::new(
        ActionType::ChangeCustodyState,
        CHAIN_ID,
        CUSTODY_STATE,
        pair.solver.guardian.party_key(),
        serde_json::json!({ "newState": 1 }),
        1,
    );
    let digest = pair
        .trader
        .engine
        .action_digest(&pair.solver.key.party_key(), &request)
        .unwrap();
    let mut request = request;
    request.signature = Some(ActionSignature::Single {
        signature: sign_digest(&digest, &pair.solver.guardian),
    });

    pair.trader
        .engine
        .submit_action(&pair.solver.key.party_key(), "custody-3", request)
        .await
        .unwrap();
    let settlement = within(downstream.blockchain.recv()).await.unwrap();
    assert_settlement(&settlement, "custody-3", solver_root(&pair));
}

#[tokio::test(start_paused = true)]
async fn test_partial_signer_set_rejected() {
    let pair = Pair::start().await;
    let mut rejects = pair
        .solver
        .engine
        .subscribe(EventFilter::topics(vec![EventTopic::Rejection]));
    pair.handshake().await;
    pair.anchor_root("custody-4");

    let request = ActionRequest::new(
        ActionType::UpdatePpm,
        CHAIN_ID,
        CUSTODY_STATE,
        joint_key(&pair),
        serde_json::Value::Null,
        8,
    );
    let digest = pair
        .trader
        .engine
        .action_digest(&pair.solver.key.party_key(), &request)
        .unwrap();
    // The trader signs alone under its own key.
    let signature = multi_sign(digest, &[&pair.trader.key]);

    pair.trader
        .engine
        .submit_action(
            &pair.solver.key.party_key(),
            "custody-4",
            request.with_multi_signature(signature),
        )
        .await
        .unwrap();
    match next_event(&mut rejects).await {
        EngineEvent::MessageRejected { msg_type, reason, .. } => {
            assert_eq!(msg_type, "PPMA");
            assert!(reason.contains("signature"), "{reason}");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unanchored_custody_rejected() {
    let pair = Pair::start().await;
    let mut rejects = pair
        .solver
        .engine
        .subscribe(EventFilter::topics(vec![EventTopic::Rejection]));
    pair.handshake().await;

    let request = ActionRequest::new(
        ActionType::CustodyToAddress,
        CHAIN_ID,
        CUSTODY_STATE,
        pair.trader.key.party_key(),
        receiver_args(),
        1,
    );
    pair.trader
        .engine
        .submit_action(&pair.solver.key.party_key(), "never-anchored", request)
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut rejects).await,
        EngineEvent::MessageRejected { .. }
    ));
}
