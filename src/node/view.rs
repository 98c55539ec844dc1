//! Serializable snapshots of a running node for operators.
use serde::Serialize;

use super::engine::{EngineStats, NodeState};
use super::NodeIdentity;
use crate::membership::{MemberStatus, MembershipEntry, Tick};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MemberView {
    pub node: String,
    pub heartbeat: i64,
    pub status: MemberStatus,
    pub last_updated: Tick,
}

impl From<&MembershipEntry> for MemberView {
    fn from(entry: &MembershipEntry) -> Self {
        Self {
            node: entry.identity.to_string(),
            heartbeat: entry.heartbeat,
            status: entry.status,
            last_updated: entry.last_updated,
        }
    }
}

/// What a node currently believes about the group
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MembershipView {
    pub node: String,
    #[serde(skip)]
    pub identity: NodeIdentity,
    pub state: NodeState,
    pub tick: Tick,
    pub heartbeat: i64,
    pub members: Vec<MemberView>,
    pub stats: EngineStats,
}

impl MembershipView {
    /// View of a node that has not started yet
    pub fn empty(identity: NodeIdentity) -> Self {
        Self {
            node: identity.to_string(),
            identity,
            state: NodeState::NotStarted,
            tick: 0,
            heartbeat: 0,
            members: Vec::new(),
            stats: EngineStats::default(),
        }
    }

    /// Members not currently declared failed, ourselves included
    pub fn live_members(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.status != MemberStatus::Failed)
            .count()
    }
}
