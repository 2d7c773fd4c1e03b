//! # Domain Layer
//!
//! Pure cryptographic logic with no I/O dependencies.

pub mod curve;
pub mod entities;
pub mod errors;
pub mod musig;
pub mod nonce_registry;
pub mod schnorr;
