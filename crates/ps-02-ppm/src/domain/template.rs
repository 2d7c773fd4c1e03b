//! # PPM Templates
//!
//! The solver ships a symbolic `PpmTemplate` in its template response. Each
//! side renders it locally against its `SessionKeys`; because references are
//! role-based, both renderings carry the same concrete keys and build the
//! same root.
//!
//! A reference that cannot be resolved leaves the leaf's key empty. Such
//! leaves are logged and never make it into the tree, so they can never
//! authorize anything.

use std::collections::BTreeMap;

use ps_01_signature::SchnorrSignature;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{Address, PartyKey};
use tracing::warn;

use super::actions::{address_hex, encode_leaf, ActionType};
use super::errors::PpmError;
use super::party::{PartyRef, SessionKeys};
use super::tree::{PpmBuilder, PpmLeaf, PpmTree};

/// One symbolic leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafTemplate {
    pub action_type: String,
    pub chain_id: u64,
    #[serde(with = "address_hex")]
    pub custody_contract: Address,
    pub custody_state: u8,
    pub party: PartyRef,
    #[serde(default)]
    pub args: Value,
    /// Parties that must each attest the leaf individually.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signers: Option<PartyRef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attestations: BTreeMap<PartyKey, SchnorrSignature>,
}

/// A symbolic policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PpmTemplate {
    pub leaves: Vec<LeafTemplate>,
}

impl PpmTemplate {
    /// Authoring-time check that every leaf names a supported action with
    /// well-formed arguments.
    pub fn validate(&self) -> Result<(), PpmError> {
        for leaf in &self.leaves {
            encode_leaf(&leaf.action_type, &leaf.args)?;
        }
        Ok(())
    }

    /// Resolve every party reference for one session.
    #[must_use]
    pub fn render_for_session(&self, keys: &SessionKeys) -> RenderedPpm {
        let leaves = self
            .leaves
            .iter()
            .enumerate()
            .map(|(index, template)| {
                let party_key = match template.party.resolve(keys) {
                    Ok(key) => Some(key),
                    Err(e) => {
                        warn!(leaf = index, party = %template.party, error = %e, "unresolved party");
                        None
                    }
                };
                let signer_keys = template.signers.as_ref().map(|signers| {
                    signers.signer_keys(keys).unwrap_or_else(|e| {
                        warn!(leaf = index, signers = %signers, error = %e, "unresolved signers");
                        Vec::new()
                    })
                });
                RenderedLeaf {
                    index,
                    template: template.clone(),
                    party_key,
                    signer_keys,
                }
            })
            .collect();
        RenderedPpm { leaves }
    }
}

/// A leaf with its references resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedLeaf {
    /// Position in the template.
    pub index: usize,
    pub template: LeafTemplate,
    /// `None` when the party reference failed to resolve.
    pub party_key: Option<PartyKey>,
    /// Required attesters; empty when the signer reference failed to resolve.
    pub signer_keys: Option<Vec<PartyKey>>,
}

impl RenderedLeaf {
    /// Whether the leaf may enter a tree.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        self.party_key.is_some() && !matches!(&self.signer_keys, Some(keys) if keys.is_empty())
    }

    /// Concrete leaf for the tree.
    pub fn to_leaf(&self) -> Result<PpmLeaf, PpmError> {
        let party = self
            .party_key
            .ok_or_else(|| PpmError::UnresolvedParty(self.template.party.to_string()))?;
        let action_type: ActionType = self.template.action_type.parse()?;
        Ok(PpmLeaf {
            action_type,
            chain_id: self.template.chain_id,
            custody_contract: self.template.custody_contract,
            custody_state: self.template.custody_state,
            encoded_args: encode_leaf(&self.template.action_type, &self.template.args)?,
            party,
        })
    }
}

/// A policy rendered for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPpm {
    pub leaves: Vec<RenderedLeaf>,
}

impl RenderedPpm {
    /// Leaves whose references did not resolve.
    pub fn unresolved(&self) -> impl Iterator<Item = &RenderedLeaf> {
        self.leaves.iter().filter(|leaf| !leaf.is_actionable())
    }

    /// Build the session's tree from every actionable, correctly attested leaf.
    ///
    /// Leaves that fail resolution, encoding or attestation are logged and
    /// skipped. Fails with `EmptyTree` if nothing is left.
    pub fn build_tree(&self) -> Result<PpmTree, PpmError> {
        let mut builder = PpmBuilder::new();
        for rendered in &self.leaves {
            if !rendered.is_actionable() {
                continue;
            }
            let leaf = match rendered.to_leaf() {
                Ok(leaf) => leaf,
                Err(e) => {
                    warn!(leaf = rendered.index, error = %e, "leaf skipped");
                    continue;
                }
            };
            let signers = rendered.signer_keys.as_deref().unwrap_or_default();
            if let Err(e) = builder.add_leaf(leaf, signers, &rendered.template.attestations) {
                warn!(leaf = rendered.index, error = %e, "leaf skipped");
            }
        }
        builder.build_tree()
    }
}
