//! # Peer Links
//!
//! A `PeerLink` is the write half of one ordered, bidirectional connection.
//! Transports (TCP adapter, in-memory test pairs) own the actual socket and
//! drain the link's queue; the read half feeds `InboundFrame`s into the
//! engine's ingress queue tagged with the link they arrived on, so replies can
//! go back the same way.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Errors writing to a link.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The transport behind the link has gone away.
    #[error("Link {0} closed")]
    Closed(u64),
}

/// Cloneable handle for sending frames to one peer.
#[derive(Clone)]
pub struct PeerLink {
    id: u64,
    sender: mpsc::Sender<Vec<u8>>,
}

impl PeerLink {
    /// Wrap the sending side of a transport's outbound queue.
    #[must_use]
    pub fn new(sender: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            id: NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed),
            sender,
        }
    }

    /// Create a link plus the receiver a transport (or test) drains.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Process-unique link id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue one frame for the peer.
    pub async fn send(&self, frame: Vec<u8>) -> Result<(), LinkError> {
        self.sender
            .send(frame)
            .await
            .map_err(|_| LinkError::Closed(self.id))
    }

    /// Whether the transport side has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerLink")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Raw bytes received on a link, queued for ingress verification.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub bytes: Vec<u8>,
    pub link: PeerLink,
}

impl InboundFrame {
    #[must_use]
    pub fn new(bytes: Vec<u8>, link: PeerLink) -> Self {
        Self { bytes, link }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_and_receive() {
        let (link, mut rx) = PeerLink::channel(4);
        link.send(b"hello".to_vec()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"hello".to_vec());
    }

    #[tokio::test]
    async fn test_send_after_close() {
        let (link, rx) = PeerLink::channel(4);
        drop(rx);
        assert!(link.is_closed());
        assert_eq!(link.send(vec![1]).await, Err(LinkError::Closed(link.id())));
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, _ra) = PeerLink::channel(1);
        let (b, _rb) = PeerLink::channel(1);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }
}
