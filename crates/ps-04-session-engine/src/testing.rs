//! In-memory wiring for tests: two engines talking over link pairs.

use shared_bus::{InboundFrame, PeerLink};
use tokio::sync::mpsc;

/// Connect two ingress queues back to back.
///
/// Returns `(a_to_b, b_to_a)`: frames sent on `a_to_b` arrive at `b_ingress`
/// tagged with `b_to_a` (so B's replies reach A), and vice versa.
#[must_use]
pub fn link_pair(
    a_ingress: mpsc::Sender<InboundFrame>,
    b_ingress: mpsc::Sender<InboundFrame>,
    capacity: usize,
) -> (PeerLink, PeerLink) {
    let (a_to_b, rx_ab) = PeerLink::channel(capacity);
    let (b_to_a, rx_ba) = PeerLink::channel(capacity);
    pump(rx_ab, b_ingress, b_to_a.clone());
    pump(rx_ba, a_ingress, a_to_b.clone());
    (a_to_b, b_to_a)
}

fn pump(mut rx: mpsc::Receiver<Vec<u8>>, ingress: mpsc::Sender<InboundFrame>, reply: PeerLink) {
    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if ingress.send(InboundFrame::new(bytes, reply.clone())).await.is_err() {
                break;
            }
        }
    });
}
