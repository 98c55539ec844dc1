use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::node::NodeIdentity;

/// Local time in ticks of the node's own clock.
pub type Tick = u64;

/// Lifecycle state of a membership entry
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Alive,
    Suspected,
    Failed,
}

impl MemberStatus {
    pub fn to_wire(self) -> u8 {
        match self {
            MemberStatus::Alive => 0,
            MemberStatus::Suspected => 1,
            MemberStatus::Failed => 2,
        }
    }

    pub fn from_wire(value: u8) -> Result<Self, DecodeError> {
        match value {
            0 => Ok(MemberStatus::Alive),
            1 => Ok(MemberStatus::Suspected),
            2 => Ok(MemberStatus::Failed),
            other => Err(DecodeError::InvalidStatus(other)),
        }
    }
}

impl std::fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberStatus::Alive => write!(f, "alive"),
            MemberStatus::Suspected => write!(f, "suspected"),
            MemberStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The part of an entry that travels on the wire.
///
/// Local timestamps never leave the node, so peers only see identity,
/// heartbeat and status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberDigest {
    pub identity: NodeIdentity,
    pub heartbeat: i64,
    pub status: MemberStatus,
}

impl MemberDigest {
    pub fn alive(identity: NodeIdentity, heartbeat: i64) -> Self {
        Self {
            identity,
            heartbeat,
            status: MemberStatus::Alive,
        }
    }
}

/// One row of the membership table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipEntry {
    pub identity: NodeIdentity,
    pub heartbeat: i64,
    /// Local tick at which `heartbeat` last advanced
    pub last_updated: Tick,
    pub status: MemberStatus,
    /// Local tick at which the entry was declared failed
    pub failed_at: Option<Tick>,
}

impl MembershipEntry {
    pub fn new(identity: NodeIdentity, heartbeat: i64, now: Tick) -> Self {
        Self {
            identity,
            heartbeat,
            last_updated: now,
            status: MemberStatus::Alive,
            failed_at: None,
        }
    }

    pub fn digest(&self) -> MemberDigest {
        MemberDigest {
            identity: self.identity,
            heartbeat: self.heartbeat,
            status: self.status,
        }
    }

    /// Ticks since the heartbeat last advanced
    pub fn silence(&self, now: Tick) -> Tick {
        now.saturating_sub(self.last_updated)
    }

    pub fn is_failed(&self) -> bool {
        self.status == MemberStatus::Failed
    }
}
