//! # Core Entities
//!
//! Fixed-size byte aliases and the `PartyKey` identity used on the wire.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::errors::MessageError;

/// A 32-byte keccak256 digest.
pub type Hash = [u8; 32];

/// A 20-byte Ethereum-style address.
pub type Address = [u8; 20];

/// Length of a compressed SEC1 secp256k1 point.
pub const COMPRESSED_KEY_LEN: usize = 33;

/// Compressed secp256k1 public key identifying a party or guardian.
///
/// Serialized as a `0x`-prefixed hex string. The bytes are not checked to be a
/// valid curve point here; the signature crate does that when it decodes them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartyKey([u8; COMPRESSED_KEY_LEN]);

impl PartyKey {
    /// Wrap raw compressed point bytes.
    #[must_use]
    pub const fn new(bytes: [u8; COMPRESSED_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw compressed point bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; COMPRESSED_KEY_LEN] {
        &self.0
    }

    /// Short form for log lines (`0x02abcd…`).
    #[must_use]
    pub fn short(&self) -> String {
        format!("0x{}…", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for PartyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PartyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartyKey({})", self.short())
    }
}

impl FromStr for PartyKey {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|_| MessageError::InvalidKey(s.to_string()))?;
        let array: [u8; COMPRESSED_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| MessageError::InvalidKey(s.to_string()))?;
        Ok(Self(array))
    }
}

impl Serialize for PartyKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PartyKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Which side of the bilateral relationship a party plays.
///
/// The trader initiates sessions; the solver answers with its PPM template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    Trader,
    Solver,
}

impl PartyRole {
    /// The role on the other side of a session.
    #[must_use]
    pub const fn counterpart(self) -> Self {
        match self {
            Self::Trader => Self::Solver,
            Self::Solver => Self::Trader,
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trader => "trader",
            Self::Solver => "solver",
        })
    }
}

impl FromStr for PartyRole {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trader" => Ok(Self::Trader),
            "solver" => Ok(Self::Solver),
            _ => Err(MessageError::InvalidField {
                field: "role",
                reason: format!("unknown role `{s}`"),
            }),
        }
    }
}

/// Lifecycle phase of a per-counterparty session.
///
/// Only ever advances `Init → PkXchg → Trade`; teardown drops the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Waiting for the template exchange.
    Init,
    /// Template delivered, waiting for the logon exchange.
    PkXchg,
    /// Operating state.
    Trade,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::PkXchg => "PKXCHG",
            Self::Trade => "TRADE",
        };
        f.write_str(name)
    }
}

/// Milliseconds since the Unix epoch, used for `SendingTime`.
#[must_use]
pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> PartyKey {
        let mut bytes = [0x11u8; COMPRESSED_KEY_LEN];
        bytes[0] = 0x02;
        PartyKey::new(bytes)
    }

    #[test]
    fn test_party_key_display_parse() {
        let key = sample_key();
        let text = key.to_string();
        assert!(text.starts_with("0x02"));
        assert_eq!(text.parse::<PartyKey>().unwrap(), key);
    }

    #[test]
    fn test_party_key_accepts_unprefixed_hex() {
        let key = sample_key();
        let unprefixed = hex::encode(key.as_bytes());
        assert_eq!(unprefixed.parse::<PartyKey>().unwrap(), key);
    }

    #[test]
    fn test_party_key_rejects_wrong_length() {
        assert!("0x0211".parse::<PartyKey>().is_err());
        assert!("not hex".parse::<PartyKey>().is_err());
    }

    #[test]
    fn test_party_role_parse_and_counterpart() {
        assert_eq!("Trader".parse::<PartyRole>().unwrap(), PartyRole::Trader);
        assert_eq!(PartyRole::Trader.counterpart(), PartyRole::Solver);
        assert!("broker".parse::<PartyRole>().is_err());
        assert_eq!(serde_json::to_string(&PartyRole::Solver).unwrap(), "\"solver\"");
    }

    #[test]
    fn test_party_key_serde_as_string() {
        let key = sample_key();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{key}\""));
        let back: PartyKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
