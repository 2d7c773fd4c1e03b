//! # PPM Merkle Tree
//!
//! Standard-tree layout compatible with on-chain `MerkleProof.verify`:
//!
//! - leaf hash = `keccak256(keccak256(abi.encode(leaf)))`
//! - leaves sorted by hash and stored at the tail of a `2n − 1` array
//! - root at index 0, children of `i` at `2i + 1` and `2i + 2`
//! - parent = `keccak256(min(a, b) ‖ max(a, b))`
//!
//! Sorted-pair hashing makes proofs position-free: a proof is just the list
//! of sibling hashes from leaf to root.
//!
//! The builder is consumed by `build_tree`, so a built tree can never change.
//! A new policy means a new tree and a new anchored root.

use std::collections::BTreeMap;

use ps_01_signature::{keccak256, verify_digest, SchnorrSignature};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use shared_types::{Address, Hash, PartyKey};
use tracing::debug;

use super::abi::{encode, Token};
use super::actions::{address_hex, ActionType};
use super::errors::PpmError;

/// A concrete leaf: one action a party may execute in one custody state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PpmLeaf {
    pub action_type: ActionType,
    pub chain_id: u64,
    #[serde(with = "address_hex")]
    pub custody_contract: Address,
    pub custody_state: u8,
    pub encoded_args: Vec<u8>,
    pub party: PartyKey,
}

impl PpmLeaf {
    /// ABI encoding:
    /// `(string actionType, uint256 chainId, address custodyContract,
    ///   uint8 custodyState, bytes encodedArgs, uint8 partyParity, bytes32 partyX)`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let key = self.party.as_bytes();
        let parity = key[0] & 1;
        let mut party_x = [0u8; 32];
        party_x.copy_from_slice(&key[1..]);

        encode(&[
            Token::String(self.action_type.as_str().to_string()),
            Token::Uint(self.chain_id),
            Token::Address(self.custody_contract),
            Token::Uint8(self.custody_state),
            Token::Bytes(self.encoded_args.clone()),
            Token::Uint8(parity),
            Token::FixedBytes32(party_x),
        ])
    }

    /// Double-hashed leaf value.
    #[must_use]
    pub fn hash(&self) -> Hash {
        keccak256(&keccak256(&self.encode()))
    }
}

/// Accumulates attested leaves before the tree is built.
#[derive(Debug, Default)]
pub struct PpmBuilder {
    leaves: Vec<PpmLeaf>,
}

impl PpmBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a leaf after checking one attestation per required signer.
    ///
    /// Each signer in `signers` must have a valid single-signer signature
    /// over the leaf hash in `attestations`; extra entries are ignored.
    /// Returns the leaf's insertion index.
    pub fn add_leaf(
        &mut self,
        leaf: PpmLeaf,
        signers: &[PartyKey],
        attestations: &BTreeMap<PartyKey, SchnorrSignature>,
    ) -> Result<usize, PpmError> {
        if !signers.is_empty() {
            let leaf_hash = leaf.hash();
            for signer in signers {
                let signature =
                    attestations
                        .get(signer)
                        .ok_or_else(|| PpmError::MissingAttestation {
                            signer: signer.to_string(),
                        })?;
                verify_digest(&leaf_hash, signature, signer).map_err(|source| {
                    PpmError::InvalidAttestation {
                        signer: signer.to_string(),
                        source,
                    }
                })?;
            }
        }
        self.leaves.push(leaf);
        Ok(self.leaves.len() - 1)
    }

    /// Number of accepted leaves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Build the tree. Leaf hashing runs in parallel.
    pub fn build_tree(self) -> Result<PpmTree, PpmError> {
        let n = self.leaves.len();
        if n == 0 {
            return Err(PpmError::EmptyTree);
        }

        let leaf_hashes: Vec<Hash> = self.leaves.par_iter().map(PpmLeaf::hash).collect();

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|a, b| leaf_hashes[*a].cmp(&leaf_hashes[*b]));

        let total = 2 * n - 1;
        let mut nodes = vec![[0u8; 32]; total];
        let mut tree_index = vec![0usize; n];
        for (sorted_pos, &original) in order.iter().enumerate() {
            let slot = total - 1 - sorted_pos;
            nodes[slot] = leaf_hashes[original];
            tree_index[original] = slot;
        }
        for i in (0..n - 1).rev() {
            nodes[i] = hash_pair(&nodes[2 * i + 1], &nodes[2 * i + 2]);
        }

        debug!(leaves = n, root = %hex::encode(nodes[0]), "ppm tree built");
        Ok(PpmTree {
            nodes,
            leaves: self.leaves,
            leaf_hashes,
            tree_index,
        })
    }
}

/// An immutable PPM tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpmTree {
    nodes: Vec<Hash>,
    leaves: Vec<PpmLeaf>,
    leaf_hashes: Vec<Hash>,
    /// Insertion index -> slot in `nodes`.
    tree_index: Vec<usize>,
}

impl PpmTree {
    /// Root hash to anchor on-chain.
    #[must_use]
    pub fn root(&self) -> Hash {
        self.nodes[0]
    }

    /// Number of leaves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Always false: empty trees cannot be built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Leaves in insertion order.
    #[must_use]
    pub fn leaves(&self) -> &[PpmLeaf] {
        &self.leaves
    }

    /// Hash of the leaf at insertion index `index`.
    pub fn leaf_hash(&self, index: usize) -> Result<Hash, PpmError> {
        self.leaf_hashes
            .get(index)
            .copied()
            .ok_or(PpmError::IndexOutOfRange {
                index,
                len: self.len(),
            })
    }

    /// Sibling hashes from the leaf at insertion index `index` up to the root.
    pub fn get_proof(&self, index: usize) -> Result<Vec<Hash>, PpmError> {
        let mut slot = *self.tree_index.get(index).ok_or(PpmError::IndexOutOfRange {
            index,
            len: self.len(),
        })?;

        let mut proof = Vec::new();
        while slot > 0 {
            let sibling = if slot % 2 == 0 { slot - 1 } else { slot + 1 };
            proof.push(self.nodes[sibling]);
            slot = (slot - 1) / 2;
        }
        Ok(proof)
    }

    /// Recompute the root from a leaf hash and proof.
    #[must_use]
    pub fn verify_proof(proof: &[Hash], leaf_hash: &Hash, root: &Hash) -> bool {
        let computed = proof
            .iter()
            .fold(*leaf_hash, |acc, sibling| hash_pair(&acc, sibling));
        computed == *root
    }

    /// Index of the leaf matching an action exactly, if any.
    #[must_use]
    pub fn find(
        &self,
        action_type: ActionType,
        chain_id: u64,
        custody_state: u8,
        party: &PartyKey,
        encoded_args: &[u8],
    ) -> Option<usize> {
        self.leaves.iter().position(|leaf| {
            leaf.action_type == action_type
                && leaf.chain_id == chain_id
                && leaf.custody_state == custody_state
                && leaf.party == *party
                && leaf.encoded_args == encoded_args
        })
    }
}

/// `keccak256(min ‖ max)`.
fn hash_pair(a: &Hash, b: &Hash) -> Hash {
    let mut buf = [0u8; 64];
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    buf[..32].copy_from_slice(lo);
    buf[32..].copy_from_slice(hi);
    keccak256(&buf)
}
