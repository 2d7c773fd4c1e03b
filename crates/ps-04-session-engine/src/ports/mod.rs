//! # Ports Layer
//!
//! - `inbound`: `SessionHandler`, the role-specific callbacks
//! - `outbound`: `CustodyAnchor`, the on-chain root lookup

pub mod inbound;
pub mod outbound;
