//! # TCP Transport
//!
//! One compact JSON message per line. Each connection gets a reader task that
//! forwards received lines to the engine's ingress queue, tagged with the
//! connection's `PeerLink` so replies go back on it, and a writer that drains
//! queued frames. A full ingress queue parks only the reader.

use std::time::Duration;

use async_trait::async_trait;
use shared_bus::{InboundFrame, PeerLink};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::domain::errors::MeshError;
use crate::ports::outbound::GuardianConnector;

/// Default connect timeout for guardian dials.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Drive `stream` in background tasks and return its link.
///
/// The connection ends when the peer closes it, a write fails, or the
/// ingress queue is gone; the link reports `is_closed()` afterwards.
pub fn spawn_connection(
    stream: TcpStream,
    ingress: mpsc::Sender<InboundFrame>,
    capacity: usize,
) -> PeerLink {
    let (link, mut outbound) = PeerLink::channel(capacity);
    let task_link = link.clone();
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".into());

    tokio::spawn(async move {
        let (read_half, write_half) = stream.into_split();
        let id = task_link.id();
        let mut reader = tokio::spawn(forward_lines(read_half, ingress, task_link, peer.clone()));
        let writer_done = tokio::select! {
            _ = write_frames(write_half, &mut outbound, &peer) => true,
            _ = &mut reader => false,
        };
        if writer_done {
            reader.abort();
        }
        debug!(peer = %peer, link = id, "connection closed");
    });

    link
}

async fn write_frames(
    mut write_half: OwnedWriteHalf,
    outbound: &mut mpsc::Receiver<Vec<u8>>,
    peer: &str,
) {
    while let Some(mut frame) = outbound.recv().await {
        frame.push(b'\n');
        if let Err(e) = write_half.write_all(&frame).await {
            warn!(peer = %peer, error = %e, "write failed");
            return;
        }
    }
}

async fn forward_lines(
    read_half: OwnedReadHalf,
    ingress: mpsc::Sender<InboundFrame>,
    link: PeerLink,
    peer: String,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let frame = InboundFrame::new(line.into_bytes(), link.clone());
                if ingress.send(frame).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!(peer = %peer, error = %e, "read failed");
                return;
            }
        }
    }
}

/// Accept connections until `shutdown` flips to `true`.
pub async fn serve(
    listener: TcpListener,
    ingress: mpsc::Sender<InboundFrame>,
    capacity: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("accept loop stopped");
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!(peer = %addr, "inbound connection");
                    spawn_connection(stream, ingress.clone(), capacity);
                }
                Err(e) => error!(error = %e, "accept error"),
            },
        }
    }
}

/// Dials guardians over TCP.
#[derive(Debug, Clone)]
pub struct TcpGuardianConnector {
    ingress: mpsc::Sender<InboundFrame>,
    capacity: usize,
    connect_timeout: Duration,
}

impl TcpGuardianConnector {
    /// Frames received from guardians are forwarded to `ingress`.
    #[must_use]
    pub fn new(ingress: mpsc::Sender<InboundFrame>, capacity: usize) -> Self {
        Self {
            ingress,
            capacity,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl GuardianConnector for TcpGuardianConnector {
    async fn connect(&self, address: &str) -> Result<PeerLink, MeshError> {
        let failed = |reason: String| MeshError::ConnectFailed {
            address: address.to_string(),
            reason,
        };
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| failed("timed out".into()))?
            .map_err(|e| failed(e.to_string()))?;
        debug!(address, "guardian connected");
        Ok(spawn_connection(stream, self.ingress.clone(), self.capacity))
    }
}
