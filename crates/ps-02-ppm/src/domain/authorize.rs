//! # Action Authorization
//!
//! A custody action is authorized iff
//!
//! 1. it matches a leaf of the session's tree exactly (action, chain, custody
//!    state, executing party and arguments),
//! 2. that leaf's inclusion proof verifies against the anchored root, and
//! 3. the request carries a valid signature by the leaf's party key over
//!    `keccak256(leafHash ‖ nonce)`.
//!
//! A multisig party key is an aggregate key, so its requests carry a
//! combined multi-party signature (or a single signature under the aggregate
//! key). No matching leaf is an authorization failure, never a retryable error.

use ps_01_signature::{keccak256, verify_digest, MessageSigner, MultiSignature, SchnorrSignature};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{Hash, PartyKey};
use tracing::debug;

use super::actions::{ActionArgs, ActionType};
use super::errors::PpmError;
use super::tree::{PpmLeaf, PpmTree};

/// Signature carried by an action request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "camelCase")]
pub enum ActionSignature {
    Single { signature: SchnorrSignature },
    Multi { signature: MultiSignature },
}

/// A proposed custody action (`Action` body field of `PPMA`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action_type: String,
    pub chain_id: u64,
    pub custody_state: u8,
    /// Executing party (may be an aggregate key).
    pub party: PartyKey,
    #[serde(default)]
    pub args: Value,
    /// Caller-chosen value making each request's digest unique.
    pub nonce: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<ActionSignature>,
}

impl ActionRequest {
    /// Unsigned request.
    #[must_use]
    pub fn new(
        action_type: ActionType,
        chain_id: u64,
        custody_state: u8,
        party: PartyKey,
        args: Value,
        nonce: u64,
    ) -> Self {
        Self {
            action_type: action_type.as_str().to_string(),
            chain_id,
            custody_state,
            party,
            args,
            nonce,
            signature: None,
        }
    }

    /// Digest the executing party signs.
    #[must_use]
    pub fn digest_for(leaf_hash: &Hash, nonce: u64) -> Hash {
        let mut preimage = [0u8; 40];
        preimage[..32].copy_from_slice(leaf_hash);
        preimage[32..].copy_from_slice(&nonce.to_be_bytes());
        keccak256(&preimage)
    }

    /// Locate the matching leaf and return its index and hash.
    pub fn matching_leaf(&self, tree: &PpmTree) -> Result<(usize, Hash), PpmError> {
        let action: ActionType = self.action_type.parse()?;
        let encoded_args = ActionArgs::from_json(action, &self.args)?.encode();
        let index = tree
            .find(
                action,
                self.chain_id,
                self.custody_state,
                &self.party,
                &encoded_args,
            )
            .ok_or_else(|| PpmError::unauthorized("no matching leaf"))?;
        Ok((index, tree.leaf_hash(index)?))
    }

    /// Digest to sign for this request under `tree`.
    pub fn signing_digest(&self, tree: &PpmTree) -> Result<Hash, PpmError> {
        let (_, leaf_hash) = self.matching_leaf(tree)?;
        Ok(Self::digest_for(&leaf_hash, self.nonce))
    }

    /// Attach a single-signer signature from `signer`.
    pub fn sign_single(
        mut self,
        tree: &PpmTree,
        signer: &dyn MessageSigner,
    ) -> Result<Self, PpmError> {
        let digest = self.signing_digest(tree)?;
        self.signature = Some(ActionSignature::Single {
            signature: signer.sign(&digest),
        });
        Ok(self)
    }

    /// Attach a combined multi-party signature.
    #[must_use]
    pub fn with_multi_signature(mut self, signature: MultiSignature) -> Self {
        self.signature = Some(ActionSignature::Multi { signature });
        self
    }
}

/// Proof that an action was authorized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedAction {
    pub leaf_index: usize,
    pub leaf_hash: Hash,
    pub leaf: PpmLeaf,
    pub proof: Vec<Hash>,
    /// The digest the party signed.
    pub digest: Hash,
}

/// Check `request` against `tree` and the root anchored on-chain.
///
/// `request.custody_state` selects the leaf but is not compared with the
/// custody's live state; callers holding that state must check it first.
///
/// # Errors
///
/// - `UnsupportedAction` / `InvalidArgs` for a malformed request
/// - `Unauthorized` for every policy or signature failure
pub fn authorize(
    tree: &PpmTree,
    request: &ActionRequest,
    anchored_root: &Hash,
) -> Result<AuthorizedAction, PpmError> {
    if tree.root() != *anchored_root {
        return Err(PpmError::unauthorized(
            "session tree root differs from the anchored root",
        ));
    }

    let (leaf_index, leaf_hash) = request.matching_leaf(tree)?;
    let proof = tree.get_proof(leaf_index)?;
    if !PpmTree::verify_proof(&proof, &leaf_hash, anchored_root) {
        return Err(PpmError::unauthorized("inclusion proof does not verify"));
    }

    let digest = ActionRequest::digest_for(&leaf_hash, request.nonce);
    let verified = match &request.signature {
        None => return Err(PpmError::unauthorized("missing signature")),
        Some(ActionSignature::Single { signature }) => {
            verify_digest(&digest, signature, &request.party)
        }
        Some(ActionSignature::Multi { signature }) => signature.verify(&request.party, &digest),
    };
    verified.map_err(|e| PpmError::unauthorized(format!("signature: {e}")))?;

    debug!(leaf = leaf_index, action = %request.action_type, "action authorized");
    Ok(AuthorizedAction {
        leaf_index,
        leaf_hash,
        leaf: tree.leaves()[leaf_index].clone(),
        proof,
        digest,
    })
}
