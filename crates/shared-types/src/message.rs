//! # Wire Message
//!
//! FIX-shaped JSON message exchanged between parties and guardians:
//!
//! ```text
//! {
//!   "StandardHeader": { BeginString, MsgType, SenderCompID, TargetCompID,
//!                       MsgSeqNum, CustodyID?, SendingTime },
//!   ...body fields...,
//!   "StandardTrailer": { PublicKey, Signature }
//! }
//! ```
//!
//! The signature covers the canonical encoding of the message with the trailer
//! removed: keys sorted at every level, compact JSON.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entities::{now_millis, PartyKey};
use crate::errors::MessageError;

/// Protocol identifier carried in every header.
pub const BEGIN_STRING: &str = "pSymm.FIX.2.0";

/// Message types understood by the session engine.
///
/// Anything not listed is an opaque trade message forwarded downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MsgType {
    /// `PPMH`: initiator asks for the responder's PPM template.
    PpmTemplateRequest,
    /// `PPMT`: responder ships its PPM template.
    PpmTemplateResponse,
    /// `A`: logon carrying guardian keys and heartbeat interval.
    Logon,
    /// `ACK`: acknowledgement (counterparty or guardian witness).
    Ack,
    /// `j`: business-level reject.
    BusinessReject,
    /// `0`: heartbeat.
    Heartbeat,
    /// `5`: logout, tears the session down.
    Logout,
    /// `PPMA`: custody action checked against the PPM.
    CustodyAction,
    /// Opaque trade message.
    Trade(String),
}

impl MsgType {
    /// Wire code for this message type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::PpmTemplateRequest => "PPMH",
            Self::PpmTemplateResponse => "PPMT",
            Self::Logon => "A",
            Self::Ack => "ACK",
            Self::BusinessReject => "j",
            Self::Heartbeat => "0",
            Self::Logout => "5",
            Self::CustodyAction => "PPMA",
            Self::Trade(code) => code,
        }
    }

    /// Whether this is a pass-through trade message.
    #[must_use]
    pub fn is_trade(&self) -> bool {
        matches!(self, Self::Trade(_))
    }
}

impl From<String> for MsgType {
    fn from(code: String) -> Self {
        match code.as_str() {
            "PPMH" => Self::PpmTemplateRequest,
            "PPMT" => Self::PpmTemplateResponse,
            "A" => Self::Logon,
            "ACK" => Self::Ack,
            "j" => Self::BusinessReject,
            "0" => Self::Heartbeat,
            "5" => Self::Logout,
            "PPMA" => Self::CustodyAction,
            _ => Self::Trade(code),
        }
    }
}

impl From<MsgType> for String {
    fn from(msg_type: MsgType) -> Self {
        msg_type.as_str().to_string()
    }
}

impl std::fmt::Display for MsgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing and sequencing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardHeader {
    #[serde(rename = "BeginString")]
    pub begin_string: String,
    #[serde(rename = "MsgType")]
    pub msg_type: MsgType,
    #[serde(rename = "SenderCompID")]
    pub sender: PartyKey,
    #[serde(rename = "TargetCompID")]
    pub target: PartyKey,
    #[serde(rename = "MsgSeqNum")]
    pub seq_num: u64,
    #[serde(rename = "CustodyID", default, skip_serializing_if = "Option::is_none")]
    pub custody_id: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "SendingTime")]
    pub sending_time: u64,
}

/// Signature block attached by the egress stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardTrailer {
    #[serde(rename = "PublicKey")]
    pub public_key: PartyKey,
    /// Hex-encoded single-signer signature.
    #[serde(rename = "Signature")]
    pub signature: String,
}

/// A wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "StandardHeader")]
    pub header: StandardHeader,
    #[serde(flatten)]
    pub body: Map<String, Value>,
    #[serde(rename = "StandardTrailer", default, skip_serializing_if = "Option::is_none")]
    pub trailer: Option<StandardTrailer>,
}

impl Message {
    /// Build an unsigned message with an empty body.
    ///
    /// The sequence number is assigned by the session that owns the counter.
    #[must_use]
    pub fn new(msg_type: MsgType, sender: PartyKey, target: PartyKey, seq_num: u64) -> Self {
        Self {
            header: StandardHeader {
                begin_string: BEGIN_STRING.to_string(),
                msg_type,
                sender,
                target,
                seq_num,
                custody_id: None,
                sending_time: now_millis(),
            },
            body: Map::new(),
            trailer: None,
        }
    }

    /// Set a body field, replacing any previous value.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Serialize) -> Self {
        // Serializing plain data into a Value cannot fail; Null marks the odd case.
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.body.insert(key.to_string(), value);
        self
    }

    /// Set the custody identifier.
    #[must_use]
    pub fn with_custody_id(mut self, custody_id: impl Into<String>) -> Self {
        self.header.custody_id = Some(custody_id.into());
        self
    }

    /// Message type shortcut.
    #[must_use]
    pub fn msg_type(&self) -> &MsgType {
        &self.header.msg_type
    }

    /// Decode a required body field.
    pub fn field<T: DeserializeOwned>(&self, key: &'static str) -> Result<T, MessageError> {
        let value = self.body.get(key).ok_or(MessageError::MissingField(key))?;
        serde_json::from_value(value.clone()).map_err(|e| MessageError::InvalidField {
            field: key,
            reason: e.to_string(),
        })
    }

    /// Decode an optional body field.
    pub fn optional_field<T: DeserializeOwned>(
        &self,
        key: &'static str,
    ) -> Result<Option<T>, MessageError> {
        match self.body.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.field(key).map(Some),
        }
    }

    /// Canonical bytes the signature covers: trailer stripped, keys sorted.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, MessageError> {
        let mut unsigned = self.clone();
        unsigned.trailer = None;
        let value =
            serde_json::to_value(&unsigned).map_err(|e| MessageError::Malformed(e.to_string()))?;
        serde_json::to_vec(&canonicalize(value)).map_err(|e| MessageError::Malformed(e.to_string()))
    }

    /// Encode for the wire (compact JSON, single line).
    pub fn to_wire(&self) -> Result<Vec<u8>, MessageError> {
        serde_json::to_vec(self).map_err(|e| MessageError::Malformed(e.to_string()))
    }

    /// Decode from wire bytes.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, MessageError> {
        serde_json::from_slice(bytes).map_err(|e| MessageError::Malformed(e.to_string()))
    }
}

/// Rebuild every object with its keys in sorted order.
///
/// Independent of whether `serde_json` was compiled with `preserve_order`.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
