//! # Adapters Layer
//!
//! Concrete implementations of the mesh's driven ports.

pub mod memory;
pub mod registry;
pub mod tcp;
