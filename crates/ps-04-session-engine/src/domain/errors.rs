//! # Session Errors

use ps_01_signature::SignatureError;
use ps_02_ppm::PpmError;
use ps_03_guardian_mesh::MeshError;
use shared_types::{ErrorKind, MessageError, MsgType, PartyKey, PartyRole, SessionPhase};
use thiserror::Error;

/// Errors raised while handling session traffic.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Message type not accepted in the session's current phase.
    #[error("{msg_type} not accepted in phase {phase}")]
    WrongPhase { msg_type: MsgType, phase: SessionPhase },

    /// Message type this party's role does not handle.
    #[error("{msg_type} is not handled by the {role} role")]
    WrongRole { msg_type: MsgType, role: PartyRole },

    /// No session exists for the counterparty.
    #[error("No session with {0:?}")]
    UnknownSession(PartyKey),

    /// A session with the counterparty already exists.
    #[error("Session with {0:?} already exists")]
    SessionExists(PartyKey),

    /// Inbound sequence number did not advance.
    #[error("Replayed MsgSeqNum {seq} (last accepted {last})")]
    Replay { seq: u64, last: u64 },

    /// The trailer is absent.
    #[error("Missing StandardTrailer")]
    MissingTrailer,

    /// The trailer key differs from `SenderCompID`.
    #[error("Trailer key does not match SenderCompID")]
    SenderMismatch,

    /// `TargetCompID` is not this party.
    #[error("Message addressed to {0:?}")]
    WrongTarget(PartyKey),

    /// The trailer signature does not verify.
    #[error("Invalid message signature: {0}")]
    BadSignature(#[source] SignatureError),

    /// Body or header decoding failed.
    #[error(transparent)]
    Message(#[from] MessageError),

    /// Policy rendering or action authorization failed.
    #[error(transparent)]
    Ppm(#[from] PpmError),

    /// Signature or nonce bookkeeping failed.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// Guardian resolution or connection failed.
    #[error(transparent)]
    Mesh(#[from] MeshError),

    /// A custody action arrived before the session has a built PPM.
    #[error("No PPM tree for this session")]
    NoPolicy,

    /// The custody contract has no anchored root for the custody id.
    #[error("No anchored PPM root for custody {0}")]
    NoAnchoredRoot(String),

    /// The action targets a custody state other than the anchored one.
    #[error("Custody {custody_id} is in state {anchored}, action is for state {requested}")]
    CustodyStateMismatch {
        custody_id: String,
        anchored: u8,
        requested: u8,
    },

    /// No own guardian is configured, so the engine cannot start.
    #[error("No own guardian configured")]
    NoOwnGuardian,

    /// A pipeline queue has gone away.
    #[error("Queue {0} closed")]
    QueueClosed(&'static str),
}

impl SessionError {
    /// Taxonomy category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WrongPhase { .. }
            | Self::WrongRole { .. }
            | Self::UnknownSession(_)
            | Self::SessionExists(_)
            | Self::Replay { .. }
            | Self::NoPolicy
            | Self::QueueClosed(_) => ErrorKind::StateError,
            Self::MissingTrailer
            | Self::SenderMismatch
            | Self::WrongTarget(_)
            | Self::BadSignature(_)
            | Self::NoAnchoredRoot(_)
            | Self::CustodyStateMismatch { .. } => ErrorKind::VerificationFailure,
            Self::NoOwnGuardian => ErrorKind::ConnectivityFailure,
            Self::Message(e) => e.kind(),
            Self::Ppm(e) => e.kind(),
            Self::Signature(e) => e.kind(),
            Self::Mesh(e) => e.kind(),
        }
    }

    /// FIX `BusinessRejectReason` code for a reject built from this error.
    #[must_use]
    pub fn reject_reason(&self) -> u32 {
        match self.kind() {
            ErrorKind::StateError | ErrorKind::ConnectivityFailure => 0,
            ErrorKind::UnsupportedAction => 3,
            ErrorKind::InvalidInput => 5,
            ErrorKind::VerificationFailure => 6,
        }
    }
}
