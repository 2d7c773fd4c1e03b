//! # Wire Helpers
//!
//! Trailer signing and verification plus builders for the control messages
//! the engine emits itself.

use ps_01_signature::{keccak256, verify_digest, MessageSigner, SchnorrSignature};
use serde::{Deserialize, Serialize};
use shared_types::{Hash, Message, MsgType, PartyKey, StandardTrailer};

use super::errors::SessionError;

/// Body fields of a logon (`A`).
pub const FIELD_GUARDIANS: &str = "GuardianPublicKeys";
pub const FIELD_HEARTBEAT: &str = "HeartBtInt";
/// Body field of a template response (`PPMT`).
pub const FIELD_TEMPLATE: &str = "PPMTemplate";
/// Body field of a custody action (`PPMA`).
pub const FIELD_ACTION: &str = "Action";
/// Reject / ack reference fields.
pub const FIELD_REF_MSG_TYPE: &str = "RefMsgType";
pub const FIELD_REF_SEQ_NUM: &str = "RefSeqNum";
pub const FIELD_REJECT_REASON: &str = "BusinessRejectReason";
pub const FIELD_TEXT: &str = "Text";

/// Digest the trailer signature covers.
pub fn signing_digest(message: &Message) -> Result<Hash, SessionError> {
    Ok(keccak256(&message.canonical_bytes()?))
}

/// Attach a trailer signed by `signer`. Already signed messages are returned
/// unchanged.
pub fn sign_once(mut message: Message, signer: &dyn MessageSigner) -> Result<Message, SessionError> {
    if message.trailer.is_some() {
        return Ok(message);
    }
    let digest = signing_digest(&message)?;
    message.trailer = Some(StandardTrailer {
        public_key: signer.party_key(),
        signature: signer.sign(&digest).to_hex(),
    });
    Ok(message)
}

/// Check the trailer against `SenderCompID`.
pub fn verify_trailer(message: &Message) -> Result<(), SessionError> {
    let trailer = message.trailer.as_ref().ok_or(SessionError::MissingTrailer)?;
    if trailer.public_key != message.header.sender {
        return Err(SessionError::SenderMismatch);
    }
    let signature: SchnorrSignature = trailer
        .signature
        .parse()
        .map_err(SessionError::BadSignature)?;
    let digest = signing_digest(message)?;
    verify_digest(&digest, &signature, &message.header.sender).map_err(SessionError::BadSignature)
}

/// Logon payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logon {
    pub guardians: Vec<PartyKey>,
    /// Seconds.
    pub heartbeat_interval: u64,
}

impl Logon {
    pub fn from_message(message: &Message) -> Result<Self, SessionError> {
        Ok(Self {
            guardians: message.field(FIELD_GUARDIANS)?,
            heartbeat_interval: message.field(FIELD_HEARTBEAT)?,
        })
    }

    #[must_use]
    pub fn into_message(self, sender: PartyKey, target: PartyKey, seq: u64) -> Message {
        Message::new(MsgType::Logon, sender, target, seq)
            .with_field(FIELD_GUARDIANS, self.guardians)
            .with_field(FIELD_HEARTBEAT, self.heartbeat_interval)
    }
}

/// Business reject (`j`) answering `rejected`.
#[must_use]
pub fn business_reject(
    rejected: &Message,
    seq: u64,
    error: &SessionError,
) -> Message {
    Message::new(
        MsgType::BusinessReject,
        rejected.header.target,
        rejected.header.sender,
        seq,
    )
    .with_field(FIELD_REF_MSG_TYPE, rejected.msg_type().as_str())
    .with_field(FIELD_REF_SEQ_NUM, rejected.header.seq_num)
    .with_field(FIELD_REJECT_REASON, error.reject_reason())
    .with_field(FIELD_TEXT, error.to_string())
}

/// Acknowledgement (`ACK`) of `acked`, sent by `sender`.
///
/// Guardians use the same shape to confirm what they witnessed.
#[must_use]
pub fn ack(acked: &Message, sender: PartyKey, target: PartyKey, seq: u64) -> Message {
    Message::new(MsgType::Ack, sender, target, seq)
        .with_field(FIELD_REF_MSG_TYPE, acked.msg_type().as_str())
        .with_field(FIELD_REF_SEQ_NUM, acked.header.seq_num)
}
