//! # Shared Types Crate
//!
//! Types every pSymm crate agrees on:
//!
//! - **Entities**: `Hash`, `Address`, `PartyKey` and timestamps
//! - **Message**: the FIX-shaped wire message (`StandardHeader`, body fields,
//!   `StandardTrailer`) and its canonical signing encoding
//! - **Errors**: the protocol error taxonomy (`ErrorKind`)
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: the message shape is defined once here so the
//!   guardian mesh and the session engine cannot disagree on it.
//! - **Identity is the key**: `SenderCompID`/`TargetCompID` carry compressed
//!   public keys, so a verified trailer is also an authenticated sender.

pub mod entities;
pub mod errors;
pub mod message;

pub use entities::*;
pub use errors::*;
pub use message::{Message, MsgType, StandardHeader, StandardTrailer, BEGIN_STRING};
