//! # Custody Actions
//!
//! The action types a PPM leaf can authorize and the ABI encoding of their
//! arguments. Arguments are authored as JSON objects with `0x`-hex strings
//! for addresses and byte strings:
//!
//! | Action | Arguments |
//! |--------|-----------|
//! | `deployConnector` | `factory: address`, `data: bytes` |
//! | `callConnector` | `connector: address`, `calldata: bytes` |
//! | `custodyToAddress` | `receiver: address` |
//! | `custodyToSmartContract` | `target: address` |
//! | `custodyToCustody` | `receiverId: bytes32` |
//! | `changeCustodyState` | `newState: uint8` |
//! | `updatePPM` | none |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use shared_types::{Address, Hash};

use super::abi::{encode, Token};
use super::errors::PpmError;

/// Supported custody action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionType {
    DeployConnector,
    CallConnector,
    CustodyToAddress,
    CustodyToSmartContract,
    CustodyToCustody,
    ChangeCustodyState,
    UpdatePpm,
}

impl ActionType {
    /// Every supported action.
    pub const ALL: [ActionType; 7] = [
        Self::DeployConnector,
        Self::CallConnector,
        Self::CustodyToAddress,
        Self::CustodyToSmartContract,
        Self::CustodyToCustody,
        Self::ChangeCustodyState,
        Self::UpdatePpm,
    ];

    /// Name used on the wire and inside the leaf encoding.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DeployConnector => "deployConnector",
            Self::CallConnector => "callConnector",
            Self::CustodyToAddress => "custodyToAddress",
            Self::CustodyToSmartContract => "custodyToSmartContract",
            Self::CustodyToCustody => "custodyToCustody",
            Self::ChangeCustodyState => "changeCustodyState",
            Self::UpdatePpm => "updatePPM",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = PpmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| PpmError::UnsupportedAction(s.to_string()))
    }
}

impl Serialize for ActionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Typed action arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionArgs {
    DeployConnector { factory: Address, data: Vec<u8> },
    CallConnector { connector: Address, calldata: Vec<u8> },
    CustodyToAddress { receiver: Address },
    CustodyToSmartContract { target: Address },
    CustodyToCustody { receiver_id: Hash },
    ChangeCustodyState { new_state: u8 },
    UpdatePpm,
}

impl ActionArgs {
    /// Parse the JSON argument object for `action`.
    pub fn from_json(action: ActionType, args: &Value) -> Result<Self, PpmError> {
        let fields = ArgFields { action, args };
        Ok(match action {
            ActionType::DeployConnector => Self::DeployConnector {
                factory: fields.fixed("factory")?,
                data: fields.bytes("data")?,
            },
            ActionType::CallConnector => Self::CallConnector {
                connector: fields.fixed("connector")?,
                calldata: fields.bytes("calldata")?,
            },
            ActionType::CustodyToAddress => Self::CustodyToAddress {
                receiver: fields.fixed("receiver")?,
            },
            ActionType::CustodyToSmartContract => Self::CustodyToSmartContract {
                target: fields.fixed("target")?,
            },
            ActionType::CustodyToCustody => Self::CustodyToCustody {
                receiver_id: fields.fixed("receiverId")?,
            },
            ActionType::ChangeCustodyState => Self::ChangeCustodyState {
                new_state: fields.uint8("newState")?,
            },
            ActionType::UpdatePpm => Self::UpdatePpm,
        })
    }

    /// ABI encoding of the arguments (empty for `updatePPM`).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::DeployConnector { factory, data } => {
                encode(&[Token::Address(*factory), Token::Bytes(data.clone())])
            }
            Self::CallConnector {
                connector,
                calldata,
            } => encode(&[Token::Address(*connector), Token::Bytes(calldata.clone())]),
            Self::CustodyToAddress { receiver } => encode(&[Token::Address(*receiver)]),
            Self::CustodyToSmartContract { target } => encode(&[Token::Address(*target)]),
            Self::CustodyToCustody { receiver_id } => encode(&[Token::FixedBytes32(*receiver_id)]),
            Self::ChangeCustodyState { new_state } => encode(&[Token::Uint8(*new_state)]),
            Self::UpdatePpm => Vec::new(),
        }
    }
}

/// Encode the arguments of a named action.
///
/// # Errors
///
/// - `UnsupportedAction` for an unknown name; nothing is encoded
/// - `InvalidArgs` for missing or malformed arguments
pub fn encode_leaf(action_type: &str, args: &Value) -> Result<Vec<u8>, PpmError> {
    let action: ActionType = action_type.parse()?;
    Ok(ActionArgs::from_json(action, args)?.encode())
}

struct ArgFields<'a> {
    action: ActionType,
    args: &'a Value,
}

impl ArgFields<'_> {
    fn invalid(&self, reason: String) -> PpmError {
        PpmError::InvalidArgs {
            action: self.action.to_string(),
            reason,
        }
    }

    fn str_field(&self, name: &str) -> Result<&str, PpmError> {
        self.args
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| self.invalid(format!("missing string field `{name}`")))
    }

    fn bytes(&self, name: &str) -> Result<Vec<u8>, PpmError> {
        let text = self.str_field(name)?;
        parse_hex(text).ok_or_else(|| self.invalid(format!("`{name}` is not hex")))
    }

    fn fixed<const N: usize>(&self, name: &str) -> Result<[u8; N], PpmError> {
        let bytes = self.bytes(name)?;
        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| self.invalid(format!("`{name}` must be {N} bytes, got {len}")))
    }

    fn uint8(&self, name: &str) -> Result<u8, PpmError> {
        self.args
            .get(name)
            .and_then(Value::as_u64)
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| self.invalid(format!("`{name}` must be an integer in 0..=255")))
    }
}

/// Decode `0x`-prefixed (or bare) hex.
pub(crate) fn parse_hex(text: &str) -> Option<Vec<u8>> {
    hex::decode(text.strip_prefix("0x").unwrap_or(text)).ok()
}

/// Serde adapter for a 20-byte address as `0x`-hex.
pub(crate) mod address_hex {
    use serde::{Deserialize, Deserializer, Serializer};
    use shared_types::Address;

    pub fn serialize<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(address)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_hex(&text)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| serde::de::Error::custom(format!("invalid address `{text}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_names_round_trip() {
        for action in ActionType::ALL {
            assert_eq!(action.as_str().parse::<ActionType>().unwrap(), action);
        }
    }

    #[test]
    fn test_unsupported_action() {
        let err = encode_leaf("withdrawEverything", &json!({})).unwrap_err();
        assert_eq!(err, PpmError::UnsupportedAction("withdrawEverything".into()));
        assert_eq!(err.kind(), shared_types::ErrorKind::UnsupportedAction);
    }

    #[test]
    fn test_custody_to_address_encoding() {
        let receiver = format!("0x{}", "11".repeat(20));
        let out = encode_leaf("custodyToAddress", &json!({ "receiver": receiver })).unwrap();
        assert_eq!(out.len(), 32);
        assert_eq!(&out[12..], &[0x11; 20]);
    }

    #[test]
    fn test_deploy_connector_encoding() {
        let args = json!({ "factory": format!("0x{}", "22".repeat(20)), "data": "0xdeadbeef" });
        let out = encode_leaf("deployConnector", &args).unwrap();
        // address word, offset word, length word, one padded data word
        assert_eq!(out.len(), 128);
        assert_eq!(out[95], 4);
        assert_eq!(&out[96..100], &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_update_ppm_has_no_args() {
        assert!(encode_leaf("updatePPM", &Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_args() {
        let short = encode_leaf("custodyToAddress", &json!({ "receiver": "0x1234" }));
        assert!(matches!(short, Err(PpmError::InvalidArgs { .. })));

        let missing = encode_leaf("custodyToCustody", &json!({}));
        assert!(matches!(missing, Err(PpmError::InvalidArgs { .. })));

        let overflow = encode_leaf("changeCustodyState", &json!({ "newState": 256 }));
        assert_eq!(overflow.unwrap_err().kind(), shared_types::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_action_type_serde() {
        let json = serde_json::to_string(&ActionType::UpdatePpm).unwrap();
        assert_eq!(json, "\"updatePPM\"");
        assert!(serde_json::from_str::<ActionType>("\"bogus\"").is_err());
    }
}
