//! # Ports Layer
//!
//! Driven ports the host wires to a registry and a transport.

pub mod outbound;
