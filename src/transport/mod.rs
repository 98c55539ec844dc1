//! Transport
//!
//! The protocol engine talks to the network through two seams: a [`Transport`]
//! for fire-and-forget sends, and an [`Inbox`] that buffers everything
//! received between ticks. A UDP implementation serves real deployments and
//! an in-memory network serves tests and simulations.
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::node::NodeIdentity;

pub mod memory;
pub mod udp;

pub use memory::SimulatedNetwork;
pub use udp::{UdpTransport, MAX_DATAGRAM_SIZE};

/// Upper bound on datagrams handled in one drain so a flood cannot stall a tick
pub const MAX_DRAIN_PER_TICK: usize = 16_384;

/// Outbound side of the node's network boundary.
///
/// Sends never block and never report delivery; loss is part of the model.
pub trait Transport: Send + Sync {
    fn send(&self, src: NodeIdentity, dst: NodeIdentity, data: Bytes);
}

/// One received message, owned by the inbox until the next tick drains it
#[derive(Clone, Debug)]
pub struct InboundDatagram {
    pub data: Bytes,
    pub source: Option<SocketAddr>,
    pub received_at: Instant,
}

impl InboundDatagram {
    pub fn new(data: Bytes, source: Option<SocketAddr>) -> Self {
        Self {
            data,
            source,
            received_at: Instant::now(),
        }
    }
}

/// Create a connected inbox pair
pub fn inbox() -> (InboxSender, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboxSender { tx }, Inbox { rx })
}

/// Producer half, held by whichever transport delivers to this node
#[derive(Clone, Debug)]
pub struct InboxSender {
    tx: mpsc::UnboundedSender<InboundDatagram>,
}

impl InboxSender {
    /// Queue a datagram; returns false once the owning node is gone
    pub fn deliver(&self, datagram: InboundDatagram) -> bool {
        self.tx.send(datagram).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves when the consuming inbox has been dropped
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Consumer half, owned by the protocol engine
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<InboundDatagram>,
}

impl Inbox {
    /// Take everything currently queued, oldest first
    pub fn drain(&mut self) -> Vec<InboundDatagram> {
        let mut drained = Vec::new();
        while drained.len() < MAX_DRAIN_PER_TICK {
            match self.rx.try_recv() {
                Ok(datagram) => drained.push(datagram),
                Err(_) => break,
            }
        }
        drained
    }
}

/// Counters shared between a transport and its background tasks
#[derive(Debug, Default)]
pub struct TransportStats {
    pub messages_sent: AtomicU64,
    pub send_errors: AtomicU64,
    pub messages_received: AtomicU64,
    pub receive_errors: AtomicU64,
    pub messages_dropped: AtomicU64,
}

impl TransportStats {
    pub fn freeze(&self) -> FrozenTransportStats {
        FrozenTransportStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TransportStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FrozenTransportStats {
    pub messages_sent: u64,
    pub send_errors: u64,
    pub messages_received: u64,
    pub receive_errors: u64,
    pub messages_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_is_fifo() {
        let (tx, mut rx) = inbox();
        for n in 0u8..5 {
            assert!(tx.deliver(InboundDatagram::new(Bytes::from(vec![n]), None)));
        }
        let drained: Vec<u8> = rx.drain().iter().map(|d| d.data[0]).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn test_deliver_after_inbox_dropped() {
        let (tx, rx) = inbox();
        drop(rx);
        assert!(tx.is_closed());
        assert!(!tx.deliver(InboundDatagram::new(Bytes::from_static(b"x"), None)));
    }

    #[test]
    fn test_stats_freeze() {
        let stats = TransportStats::default();
        stats.messages_sent.fetch_add(3, Ordering::Relaxed);
        stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
        let frozen = stats.freeze();
        assert_eq!(frozen.messages_sent, 3);
        assert_eq!(frozen.messages_dropped, 1);
        assert_eq!(frozen.messages_received, 0);
    }
}
