//! Membership change notifications.
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::info;

use super::NodeIdentity;

/// Receives one call per membership transition seen by `observer`.
///
/// `log_add` fires when a peer is first seen (or comes back after being
/// declared failed); `log_remove` fires when the local failure detector
/// declares a peer failed. Purging a failed entry is not reported.
pub trait MembershipObserver: Send + Sync {
    fn log_add(&self, observer: NodeIdentity, added: NodeIdentity);
    fn log_remove(&self, observer: NodeIdentity, removed: NodeIdentity);
}

/// Writes membership changes to the tracing log
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl MembershipObserver for TracingObserver {
    fn log_add(&self, observer: NodeIdentity, added: NodeIdentity) {
        info!(observer = %observer, node = %added, "[{}] Node {} joined", observer, added);
    }

    fn log_remove(&self, observer: NodeIdentity, removed: NodeIdentity) {
        info!(observer = %observer, node = %removed, "[{}] Node {} removed", observer, removed);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MembershipEvent {
    Added {
        observer: NodeIdentity,
        node: NodeIdentity,
    },
    Removed {
        observer: NodeIdentity,
        node: NodeIdentity,
    },
}

/// Keeps every event in memory; shared across all nodes of a simulation
#[derive(Clone, Debug, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<MembershipEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MembershipEvent> {
        self.lock().clone()
    }

    /// Number of `log_add` calls `observer` made about `node`
    pub fn adds(&self, observer: NodeIdentity, node: NodeIdentity) -> usize {
        let wanted = MembershipEvent::Added { observer, node };
        self.lock().iter().filter(|e| **e == wanted).count()
    }

    /// Number of `log_remove` calls `observer` made about `node`
    pub fn removes(&self, observer: NodeIdentity, node: NodeIdentity) -> usize {
        let wanted = MembershipEvent::Removed { observer, node };
        self.lock().iter().filter(|e| **e == wanted).count()
    }

    fn push(&self, event: MembershipEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MembershipEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MembershipObserver for RecordingObserver {
    fn log_add(&self, observer: NodeIdentity, added: NodeIdentity) {
        self.push(MembershipEvent::Added {
            observer,
            node: added,
        });
    }

    fn log_remove(&self, observer: NodeIdentity, removed: NodeIdentity) {
        self.push(MembershipEvent::Removed {
            observer,
            node: removed,
        });
    }
}
