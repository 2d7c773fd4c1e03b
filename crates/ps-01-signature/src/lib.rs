//! # Signature Module (PS-01)
//!
//! Schnorr signatures over secp256k1 in two flavours sharing one challenge
//! rule, `e = H(Px ‖ parity ‖ msgHash ‖ address(R))`:
//!
//! - **Single signer**: `sign_digest` / `verify_digest`. Verification
//!   recomputes `s·G − e·P` and compares its address with the nonce address
//!   carried in the signature (the ecrecover-friendly form settlement
//!   contracts verify).
//! - **Multi-party**: `aggregate_keys`, `aggregate_nonces`, `partial_sign`,
//!   `combine`, `verify`. Keys are combined with hash-derived coefficients and
//!   every signer contributes a set of nonces folded with a binding
//!   coefficient, so neither rogue keys nor nonce reuse across messages can
//!   forge a combined signature.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): pure curve arithmetic, no I/O
//! - **Ports Layer** (`ports/`): `MessageSigner` seam used by the session engine
//!
//! ## Security Notes
//!
//! - **Half-order rule**: single-signer keys must have `Px < (n/2)+1`;
//!   generation enforces it and verification rejects anything else.
//! - **Single-use nonces**: a `NonceSet` is wiped by `partial_sign`; a second
//!   use is a `StateError`, never a silent re-sign.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod ports;

// Re-export public API
pub use domain::curve::{
    address_from_point, decode_point, encode_point, hash_to_scalar, is_below_half_order, keccak256,
    x_and_parity,
};
pub use domain::entities::{
    AggregateKey, AggregateNonce, KeyPair, MultiSignature, NonceSet, PartialSignature,
    PublicNonces, SchnorrSignature,
};
pub use domain::errors::SignatureError;
pub use domain::musig::{
    aggregate_keys, aggregate_nonces, combine, multi_challenge, partial_sign, verify,
    verify_multi, SigningSession,
};
pub use domain::nonce_registry::ConsumedNonceRegistry;
pub use domain::schnorr::{challenge, sign_digest, sign_message, verify_digest, verify_message};
pub use ports::inbound::{MessageSigner, SchnorrVerifier};
