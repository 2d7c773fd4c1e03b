//! # PPM Authorization Tree (PS-02)
//!
//! The Party Permission Matrix declares which signer may execute which
//! custody action in which custody state. It is authored as a symbolic
//! template, rendered per session into concrete keys, and committed to as a
//! Merkle root that the custody contract anchors on-chain.
//!
//! ## Flow
//!
//! ```text
//! PpmTemplate --render_for_session--> RenderedPpm --build_tree--> PpmTree (root)
//!                                                                   |
//! ActionRequest + signature ----------------------------- authorize(tree, req, anchored_root)
//! ```
//!
//! ## Multisig Rule
//!
//! - **Executing party** (`party`): a multisig reference resolves to a true
//!   aggregate key; the action needs a combined multi-party signature.
//! - **Leaf attesters** (`signers`): every resolved signer must attest the
//!   leaf with its own single-signer signature; nothing is aggregated.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;

// Re-export public API
pub use domain::abi::{encode as abi_encode, Token};
pub use domain::actions::{encode_leaf, ActionArgs, ActionType};
pub use domain::authorize::{authorize, ActionRequest, ActionSignature, AuthorizedAction};
pub use domain::errors::PpmError;
pub use domain::party::{PartyRef, SessionKeys};
pub use domain::template::{LeafTemplate, PpmTemplate, RenderedLeaf, RenderedPpm};
pub use domain::tree::{PpmBuilder, PpmLeaf, PpmTree};
