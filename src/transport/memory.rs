//! In-memory network for tests and simulations.
//!
//! Delivery is synchronous: a send lands in the destination inbox before
//! `send` returns, so a whole cluster can be stepped deterministically from a
//! single thread. Loss is driven by a seeded RNG.
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use super::{inbox, FrozenTransportStats, InboundDatagram, Inbox, InboxSender, Transport, TransportStats};
use crate::node::NodeIdentity;

#[derive(Clone, Debug)]
pub struct SimulatedNetwork {
    inner: Arc<NetworkInner>,
}

#[derive(Debug)]
struct NetworkInner {
    mailboxes: DashMap<NodeIdentity, InboxSender>,
    drop_rate: f64,
    rng: Mutex<StdRng>,
    stats: TransportStats,
}

impl SimulatedNetwork {
    /// A network that delivers every message
    pub fn reliable() -> Self {
        Self::lossy(0.0, 0)
    }

    /// A network that drops each message independently with probability `drop_rate`
    pub fn lossy(drop_rate: f64, seed: u64) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                mailboxes: DashMap::new(),
                drop_rate: drop_rate.clamp(0.0, 1.0),
                rng: Mutex::new(StdRng::seed_from_u64(seed)),
                stats: TransportStats::default(),
            }),
        }
    }

    /// Attach `identity` to the network and hand back its inbox
    pub fn register(&self, identity: NodeIdentity) -> Inbox {
        let (tx, rx) = inbox();
        self.inner.mailboxes.insert(identity, tx);
        rx
    }

    /// Detach `identity`; anything addressed to it from now on is lost
    pub fn crash(&self, identity: NodeIdentity) {
        self.inner.mailboxes.remove(&identity);
    }

    pub fn is_attached(&self, identity: &NodeIdentity) -> bool {
        self.inner.mailboxes.contains_key(identity)
    }

    pub fn stats(&self) -> FrozenTransportStats {
        self.inner.stats.freeze()
    }

    fn should_drop(&self) -> bool {
        if self.inner.drop_rate <= 0.0 {
            return false;
        }
        let mut rng = self
            .inner
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.random_bool(self.inner.drop_rate)
    }
}

impl Transport for SimulatedNetwork {
    fn send(&self, src: NodeIdentity, dst: NodeIdentity, data: Bytes) {
        let stats = &self.inner.stats;
        stats.messages_sent.fetch_add(1, Ordering::Relaxed);

        if self.should_drop() {
            stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
            trace!("[{}] Dropped message to {}", src, dst);
            return;
        }

        let delivered = self
            .inner
            .mailboxes
            .get(&dst)
            .map(|mailbox| mailbox.deliver(InboundDatagram::new(data, Some(src.socket_addr()))))
            .unwrap_or(false);

        if delivered {
            stats.messages_received.fetch_add(1, Ordering::Relaxed);
        } else {
            stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}
