//! # ABI Encoding
//!
//! The subset of Solidity `abi.encode` needed for PPM leaves: static words
//! (`uint`, `address`, `bytes32`) in the head, dynamic `bytes`/`string`
//! referenced by offset and appended as `length ‖ data` padded to 32 bytes.

use shared_types::{Address, Hash};

/// One ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `uint256` from a u64 (left-padded).
    Uint(u64),
    /// `uint8`.
    Uint8(u8),
    Address(Address),
    FixedBytes32(Hash),
    Bytes(Vec<u8>),
    String(String),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Self::Bytes(_) | Self::String(_))
    }

    fn head_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        match self {
            Self::Uint(v) => word[24..].copy_from_slice(&v.to_be_bytes()),
            Self::Uint8(v) => word[31] = *v,
            Self::Address(a) => word[12..].copy_from_slice(a),
            Self::FixedBytes32(h) => word.copy_from_slice(h),
            Self::Bytes(_) | Self::String(_) => {}
        }
        word
    }

    fn tail(&self) -> Vec<u8> {
        let data: &[u8] = match self {
            Self::Bytes(b) => b,
            Self::String(s) => s.as_bytes(),
            _ => return Vec::new(),
        };
        let mut out = Vec::with_capacity(32 + padded_len(data.len()));
        out.extend_from_slice(&Token::Uint(data.len() as u64).head_word());
        out.extend_from_slice(data);
        out.resize(32 + padded_len(data.len()), 0);
        out
    }
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(32) * 32
}

/// `abi.encode(tokens...)`.
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * 32;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            let offset = (head_len + tail.len()) as u64;
            head.extend_from_slice(&Token::Uint(offset).head_word());
            tail.extend_from_slice(&token.tail());
        } else {
            head.extend_from_slice(&token.head_word());
        }
    }

    head.extend_from_slice(&tail);
    head
}
