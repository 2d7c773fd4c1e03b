//! # Domain Layer
//!
//! Session state, wire helpers and routing types. No I/O.

pub mod errors;
pub mod routing;
pub mod session;
pub mod wire;
