//! # Domain Layer
//!
//! Pure policy logic: encoding, party resolution, tree construction and the
//! authorization check.

pub mod abi;
pub mod actions;
pub mod authorize;
pub mod errors;
pub mod party;
pub mod template;
pub mod tree;
