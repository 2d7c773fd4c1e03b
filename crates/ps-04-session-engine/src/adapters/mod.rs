//! # Adapters

pub mod anchor;
