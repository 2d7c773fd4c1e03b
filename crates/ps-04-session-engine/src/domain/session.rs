//! # Session State
//!
//! One `Session` per counterparty. The phase only moves forward
//! (`INIT → PKXCHG → TRADE`); teardown removes the session, so a reconnect
//! starts again from `INIT` with fresh counters.

use std::collections::HashMap;
use std::time::Duration;

use ps_02_ppm::{PpmTemplate, PpmTree, RenderedPpm};
use shared_bus::PeerLink;
use shared_types::{MsgType, PartyKey, SessionPhase};
use tokio::time::Instant;

use super::errors::SessionError;

/// Per-counterparty protocol state.
#[derive(Debug)]
pub struct Session {
    counterparty: PartyKey,
    link: PeerLink,
    phase: SessionPhase,
    /// Next outgoing `MsgSeqNum`.
    next_seq: u64,
    /// Highest inbound `MsgSeqNum` accepted so far (0 = none).
    last_inbound_seq: u64,
    pub(crate) template: Option<PpmTemplate>,
    pub(crate) logon_sent: bool,
    pub(crate) counterparty_guardians: Vec<PartyKey>,
    pub(crate) rendered: Option<RenderedPpm>,
    pub(crate) tree: Option<PpmTree>,
    pub(crate) guardian_links: HashMap<PartyKey, PeerLink>,
    heartbeat_interval: Duration,
    counterparty_heartbeat: Option<Duration>,
    last_heartbeat_sent: Instant,
    last_heartbeat_received: Instant,
    overdue_reported: bool,
}

impl Session {
    /// Fresh session in `INIT`. `heartbeat_interval` is our own sending interval.
    #[must_use]
    pub fn new(counterparty: PartyKey, link: PeerLink, heartbeat_interval: Duration, now: Instant) -> Self {
        Self {
            counterparty,
            link,
            phase: SessionPhase::Init,
            next_seq: 1,
            last_inbound_seq: 0,
            template: None,
            logon_sent: false,
            counterparty_guardians: Vec::new(),
            rendered: None,
            tree: None,
            guardian_links: HashMap::new(),
            heartbeat_interval,
            counterparty_heartbeat: None,
            last_heartbeat_sent: now,
            last_heartbeat_received: now,
            overdue_reported: false,
        }
    }

    #[must_use]
    pub fn counterparty(&self) -> PartyKey {
        self.counterparty
    }

    /// Link to the counterparty.
    #[must_use]
    pub fn link(&self) -> &PeerLink {
        &self.link
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Rendered policy, once logon completed.
    #[must_use]
    pub fn rendered(&self) -> Option<&RenderedPpm> {
        self.rendered.as_ref()
    }

    /// Policy tree, once logon completed and at least one leaf survived.
    #[must_use]
    pub fn tree(&self) -> Option<&PpmTree> {
        self.tree.as_ref()
    }

    /// Counterparty guardian keys advertised at logon.
    #[must_use]
    pub fn counterparty_guardians(&self) -> &[PartyKey] {
        &self.counterparty_guardians
    }

    /// Guardians with an open link.
    #[must_use]
    pub fn connected_guardians(&self) -> Vec<PartyKey> {
        let mut keys: Vec<PartyKey> = self.guardian_links.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Take the next outgoing sequence number.
    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Last sequence number handed out (0 before any).
    #[must_use]
    pub fn last_sent_seq(&self) -> u64 {
        self.next_seq - 1
    }

    /// Record an inbound sequence number, refusing anything not newer.
    pub fn accept_inbound(&mut self, seq: u64) -> Result<(), SessionError> {
        if seq <= self.last_inbound_seq {
            return Err(SessionError::Replay {
                seq,
                last: self.last_inbound_seq,
            });
        }
        self.last_inbound_seq = seq;
        Ok(())
    }

    /// Fail unless the session is in `phase`.
    pub fn expect_phase(&self, phase: SessionPhase, msg_type: &MsgType) -> Result<(), SessionError> {
        if self.phase == phase {
            Ok(())
        } else {
            Err(SessionError::WrongPhase {
                msg_type: msg_type.clone(),
                phase: self.phase,
            })
        }
    }

    /// Move to the next phase. Returns the phase left behind.
    ///
    /// `TRADE` is terminal; asking to advance from it is a `WrongPhase` error.
    pub fn advance(&mut self, msg_type: &MsgType) -> Result<SessionPhase, SessionError> {
        let from = self.phase;
        self.phase = match from {
            SessionPhase::Init => SessionPhase::PkXchg,
            SessionPhase::PkXchg => SessionPhase::Trade,
            SessionPhase::Trade => {
                return Err(SessionError::WrongPhase {
                    msg_type: msg_type.clone(),
                    phase: from,
                })
            }
        };
        Ok(from)
    }

    /// Note the counterparty's advertised heartbeat interval and restart the
    /// silence clock.
    pub fn set_counterparty_heartbeat(&mut self, interval: Duration, now: Instant) {
        self.counterparty_heartbeat = Some(interval);
        self.last_heartbeat_received = now;
        self.last_heartbeat_sent = now;
        self.overdue_reported = false;
    }

    /// Any inbound traffic proves liveness.
    pub fn record_heartbeat(&mut self, now: Instant) {
        self.last_heartbeat_received = now;
        self.overdue_reported = false;
    }

    /// Whether a heartbeat is due at `now`; if so the send time is recorded.
    pub fn take_heartbeat_due(&mut self, now: Instant) -> bool {
        if self.phase != SessionPhase::Trade {
            return false;
        }
        if now.saturating_duration_since(self.last_heartbeat_sent) < self.heartbeat_interval {
            return false;
        }
        self.last_heartbeat_sent = now;
        true
    }

    /// Silence duration, reported once per silent period after `2 × HeartBtInt`.
    pub fn take_overdue(&mut self, now: Instant) -> Option<Duration> {
        let interval = self.counterparty_heartbeat?;
        if self.phase != SessionPhase::Trade || self.overdue_reported {
            return None;
        }
        let silent = now.saturating_duration_since(self.last_heartbeat_received);
        if silent >= interval.saturating_mul(2) {
            self.overdue_reported = true;
            Some(silent)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(fill: u8) -> PartyKey {
        let mut bytes = [fill; 33];
        bytes[0] = 0x02;
        PartyKey::new(bytes)
    }

    fn session(now: Instant) -> Session {
        let (link, _rx) = PeerLink::channel(1);
        Session::new(key(1), link, Duration::from_secs(30), now)
    }

    #[test]
    fn test_phase_only_advances() {
        let mut s = session(Instant::now());
        assert_eq!(s.phase(), SessionPhase::Init);
        assert_eq!(s.advance(&MsgType::PpmTemplateResponse).unwrap(), SessionPhase::Init);
        assert_eq!(s.advance(&MsgType::Logon).unwrap(), SessionPhase::PkXchg);
        assert_eq!(s.phase(), SessionPhase::Trade);
        assert!(matches!(
            s.advance(&MsgType::Logon),
            Err(SessionError::WrongPhase { phase: SessionPhase::Trade, .. })
        ));
        assert_eq!(s.phase(), SessionPhase::Trade);
    }

    #[test]
    fn test_expect_phase() {
        let s = session(Instant::now());
        assert!(s.expect_phase(SessionPhase::Init, &MsgType::PpmTemplateRequest).is_ok());
        assert!(s.expect_phase(SessionPhase::Trade, &MsgType::Heartbeat).is_err());
    }

    #[test]
    fn test_sequence_numbers() {
        let mut s = session(Instant::now());
        assert_eq!(s.last_sent_seq(), 0);
        assert_eq!(s.next_seq(), 1);
        assert_eq!(s.next_seq(), 2);
        assert_eq!(s.last_sent_seq(), 2);
    }

    #[test]
    fn test_inbound_replay_refused() {
        let mut s = session(Instant::now());
        s.accept_inbound(1).unwrap();
        s.accept_inbound(3).unwrap();
        assert!(matches!(s.accept_inbound(3), Err(SessionError::Replay { seq: 3, last: 3 })));
        assert!(s.accept_inbound(2).is_err());
        s.accept_inbound(4).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_due_only_in_trade() {
        let start = Instant::now();
        let mut s = session(start);
        let later = start + Duration::from_secs(31);
        assert!(!s.take_heartbeat_due(later));

        s.advance(&MsgType::PpmTemplateResponse).unwrap();
        s.advance(&MsgType::Logon).unwrap();
        s.set_counterparty_heartbeat(Duration::from_secs(30), start);
        assert!(!s.take_heartbeat_due(start + Duration::from_secs(29)));
        assert!(s.take_heartbeat_due(later));
        assert!(!s.take_heartbeat_due(later + Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overdue_reported_once() {
        let start = Instant::now();
        let mut s = session(start);
        s.advance(&MsgType::PpmTemplateResponse).unwrap();
        s.advance(&MsgType::Logon).unwrap();
        s.set_counterparty_heartbeat(Duration::from_secs(10), start);

        assert_eq!(s.take_overdue(start + Duration::from_secs(19)), None);
        assert_eq!(
            s.take_overdue(start + Duration::from_secs(20)),
            Some(Duration::from_secs(20))
        );
        assert_eq!(s.take_overdue(start + Duration::from_secs(25)), None);

        s.record_heartbeat(start + Duration::from_secs(26));
        assert!(s.take_overdue(start + Duration::from_secs(46)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overdue_with_huge_interval_never_fires() {
        let start = Instant::now();
        let mut s = session(start);
        s.advance(&MsgType::PpmTemplateResponse).unwrap();
        s.advance(&MsgType::Logon).unwrap();
        s.set_counterparty_heartbeat(Duration::from_secs(u64::MAX), start);

        assert_eq!(s.take_overdue(start + Duration::from_secs(3600)), None);
    }
}
