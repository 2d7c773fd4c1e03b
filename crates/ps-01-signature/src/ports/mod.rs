//! # Ports Layer
//!
//! Seams through which the session engine signs and verifies.

pub mod inbound;
