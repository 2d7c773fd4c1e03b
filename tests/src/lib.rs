//! # pSymm Test Suite
//!
//! Cross-crate scenarios that no single crate can test on its own.
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs         # shared PPM template and party setup
//!     ├── tcp_session.rs      # two nodes over real sockets with TCP guardians
//!     └── custody_actions.rs  # single and multi-party PPMA authorization
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ps-tests
//! cargo test -p ps-tests integration::custody_actions
//! ```

pub mod integration;
