//! Protocol Engine
//!
//! A single-threaded state machine driven by `tick`. Each tick drains the
//! inbox in arrival order, advances our own heartbeat, runs failure detection
//! and cleanup, and finally pushes the whole table to a few random peers.
//!
//! ```text
//! NotStarted --start--> Joining --JoinReply--> InGroup --shutdown--> Stopped
//!      \                   \
//!       \--start (founder)--\--------------------> InGroup
//!                            \--no reply after max attempts--> BootstrapFailed
//! ```
use std::sync::Arc;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::observer::MembershipObserver;
use super::view::{MemberView, MembershipView};
use super::NodeIdentity;
use crate::membership::{MemberDigest, MemberStatus, MembershipTable, Tick};
use crate::protocol::{codec, ProtocolMessage};
use crate::settings::{ProtocolConfig, MAX_JOIN_BACKOFF_TICKS};
use crate::transport::{Inbox, Transport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    NotStarted,
    Joining,
    InGroup,
    /// Gave up on the introducer; terminal
    BootstrapFailed,
    /// Shut down by the operator; terminal
    Stopped,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::NotStarted => write!(f, "not_started"),
            NodeState::Joining => write!(f, "joining"),
            NodeState::InGroup => write!(f, "in_group"),
            NodeState::BootstrapFailed => write!(f, "bootstrap_failed"),
            NodeState::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct JoinProgress {
    attempts: u32,
    backoff: Tick,
    next_attempt_at: Tick,
}

/// Per-node state owned by the engine
#[derive(Clone, Debug)]
pub struct NodeRuntimeState {
    pub self_id: NodeIdentity,
    pub state: NodeState,
    pub table: MembershipTable,
    pub join_addr: NodeIdentity,
    join: JoinProgress,
}

impl NodeRuntimeState {
    fn new(self_id: NodeIdentity, join_addr: NodeIdentity) -> Self {
        Self {
            self_id,
            state: NodeState::NotStarted,
            table: MembershipTable::new(self_id, 0),
            join_addr,
            join: JoinProgress::default(),
        }
    }

    pub fn in_group(&self) -> bool {
        self.state == NodeState::InGroup
    }

    pub fn is_founder(&self) -> bool {
        self.self_id == self.join_addr
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub messages_received: u64,
    pub decode_errors: u64,
    pub messages_sent: u64,
    pub gossip_rounds: u64,
    pub join_requests_sent: u64,
    pub join_requests_served: u64,
    pub nodes_added: u64,
    pub nodes_removed: u64,
}

pub struct ProtocolEngine {
    runtime: NodeRuntimeState,
    config: ProtocolConfig,
    inbox: Inbox,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn MembershipObserver>,
    rng: StdRng,
    stats: EngineStats,
    now: Tick,
}

impl std::fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("self_id", &self.runtime.self_id)
            .field("state", &self.runtime.state)
            .field("now", &self.now)
            .field("members", &self.runtime.table.len())
            .finish()
    }
}

impl ProtocolEngine {
    pub fn new(
        self_id: NodeIdentity,
        config: ProtocolConfig,
        inbox: Inbox,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn MembershipObserver>,
    ) -> Self {
        Self {
            runtime: NodeRuntimeState::new(self_id, config.introducer),
            config,
            inbox,
            transport,
            observer,
            rng: StdRng::from_os_rng(),
            stats: EngineStats::default(),
            now: 0,
        }
    }

    /// Replace the peer-selection RNG, for reproducible runs
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn self_id(&self) -> NodeIdentity {
        self.runtime.self_id
    }

    pub fn state(&self) -> NodeState {
        self.runtime.state
    }

    pub fn runtime(&self) -> &NodeRuntimeState {
        &self.runtime
    }

    pub fn table(&self) -> &MembershipTable {
        &self.runtime.table
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Tick of the most recent `start` or `tick`
    pub fn now(&self) -> Tick {
        self.now
    }

    /// Enter the group: found it if we are the introducer, otherwise ask to join.
    pub fn start(&mut self, now: Tick) {
        let self_id = self.runtime.self_id;
        if self.runtime.state != NodeState::NotStarted {
            warn!("[{}] start called in state {}, ignoring", self_id, self.runtime.state);
            return;
        }

        self.now = now;
        self.runtime.table = MembershipTable::new(self_id, now);

        if self.runtime.is_founder() {
            info!("[{}] Starting up group", self_id);
            self.runtime.state = NodeState::InGroup;
            return;
        }

        info!("[{}] Trying to join via {}", self_id, self.runtime.join_addr);
        self.runtime.state = NodeState::Joining;
        self.runtime.join = JoinProgress {
            attempts: 0,
            backoff: self.config.join_retry_ticks,
            next_attempt_at: now,
        };
        self.send_join_request();
    }

    /// Run one protocol period at logical time `now`
    pub fn tick(&mut self, now: Tick) {
        match self.runtime.state {
            NodeState::Joining | NodeState::InGroup => {}
            _ => return,
        }
        debug_assert!(now >= self.now, "tick went backwards: {} < {}", now, self.now);
        self.now = now;

        self.drain_inbox();

        match self.runtime.state {
            NodeState::Joining => self.retry_join_if_due(),
            NodeState::InGroup => {
                self.runtime.table.advance_self(now);
                self.detect_failures();
                self.gossip();
            }
            _ => {}
        }
    }

    /// Leave without notice; peers will time us out.
    ///
    /// Everything learned about peers is discarded, only our own entry stays.
    pub fn shutdown(&mut self) {
        if self.runtime.state == NodeState::Stopped {
            return;
        }
        info!("[{}] Shutting down", self.runtime.self_id);
        self.runtime.state = NodeState::Stopped;
        self.runtime.table.clear_peers();
    }

    pub fn view(&self) -> MembershipView {
        MembershipView {
            node: self.runtime.self_id.to_string(),
            identity: self.runtime.self_id,
            state: self.runtime.state,
            tick: self.now,
            heartbeat: self.runtime.table.self_heartbeat(),
            members: self.runtime.table.iter().map(MemberView::from).collect(),
            stats: self.stats.clone(),
        }
    }

    fn drain_inbox(&mut self) {
        for datagram in self.inbox.drain() {
            self.stats.messages_received += 1;
            match codec::decode(&datagram.data) {
                Ok(message) => self.dispatch(message),
                Err(e) => {
                    self.stats.decode_errors += 1;
                    debug!(
                        "[{}] Dropping undecodable message from {:?}: {}",
                        self.runtime.self_id, datagram.source, e
                    );
                }
            }
        }
    }

    fn dispatch(&mut self, message: ProtocolMessage) {
        match message {
            ProtocolMessage::JoinRequest {
                identity,
                heartbeat,
            } => self.handle_join_request(identity, heartbeat),
            ProtocolMessage::JoinReply { entries } => self.handle_join_reply(&entries),
            ProtocolMessage::Gossip { entries } => self.merge_entries(&entries),
        }
    }

    fn handle_join_request(&mut self, identity: NodeIdentity, heartbeat: i64) {
        let self_id = self.runtime.self_id;
        if identity == self_id {
            warn!("[{}] Ignoring join request carrying our own identity", self_id);
            return;
        }

        debug!("[{}] Join request from {}", self_id, identity);
        self.merge_entries(&[MemberDigest::alive(identity, heartbeat)]);

        for payload in self.table_payloads(|entries| ProtocolMessage::JoinReply { entries }) {
            self.send_payload(identity, payload);
        }
        self.stats.join_requests_served += 1;
    }

    fn handle_join_reply(&mut self, entries: &[MemberDigest]) {
        self.merge_entries(entries);
        if self.runtime.state == NodeState::Joining {
            info!(
                "[{}] Joined the group, {} members known",
                self.runtime.self_id,
                self.runtime.table.len()
            );
            self.runtime.state = NodeState::InGroup;
        }
    }

    /// Merge peer-reported entries, reporting every newly observed member once
    fn merge_entries(&mut self, entries: &[MemberDigest]) {
        let self_id = self.runtime.self_id;
        for digest in entries {
            // Failure is only ever declared locally
            if digest.status == MemberStatus::Failed {
                continue;
            }
            let merge = self.runtime.table.upsert(digest, self.now);
            if merge.is_newly_observed() {
                self.observer.log_add(self_id, digest.identity);
                self.stats.nodes_added += 1;
            }
        }
    }

    fn detect_failures(&mut self) {
        let self_id = self.runtime.self_id;
        let now = self.now;

        if let Some(suspect_timeout) = self.config.suspect_timeout {
            for suspect in self.runtime.table.mark_suspected(now, suspect_timeout) {
                debug!("[{}] Suspecting {}", self_id, suspect);
            }
        }

        for failed in self.runtime.table.mark_timed_out(now, self.config.fail_timeout) {
            self.observer.log_remove(self_id, failed);
            self.stats.nodes_removed += 1;
        }

        for purged in self.runtime.table.purge_failed(now, self.config.cleanup_timeout) {
            debug!("[{}] Purged {}", self_id, purged);
        }
    }

    fn gossip(&mut self) {
        let targets = self
            .runtime
            .table
            .sample_gossip_targets(self.config.gossip_fanout, &mut self.rng);
        if targets.is_empty() {
            return;
        }

        let payloads = self.table_payloads(|entries| ProtocolMessage::Gossip { entries });
        for target in targets {
            for payload in &payloads {
                self.send_payload(target, payload.clone());
            }
        }
        self.stats.gossip_rounds += 1;
    }

    /// Encode the whole table as one or more messages, each within a datagram
    fn table_payloads(&self, wrap: fn(Vec<MemberDigest>) -> ProtocolMessage) -> Vec<Bytes> {
        self.runtime
            .table
            .digests()
            .chunks(codec::MAX_ENTRIES_PER_MESSAGE)
            .map(|chunk| codec::encode(&wrap(chunk.to_vec())))
            .collect()
    }

    fn retry_join_if_due(&mut self) {
        let join = self.runtime.join;
        if self.now < join.next_attempt_at {
            return;
        }

        let max_attempts = self.config.join_max_attempts;
        if max_attempts != 0 && join.attempts >= max_attempts {
            error!(
                "[{}] No join reply from {} after {} attempts, giving up",
                self.runtime.self_id, self.runtime.join_addr, join.attempts
            );
            self.runtime.state = NodeState::BootstrapFailed;
            return;
        }

        self.runtime.join.backoff = (join.backoff * 2).min(MAX_JOIN_BACKOFF_TICKS);
        warn!(
            "[{}] No join reply from {} yet, retrying",
            self.runtime.self_id, self.runtime.join_addr
        );
        self.send_join_request();
    }

    fn send_join_request(&mut self) {
        let request = ProtocolMessage::JoinRequest {
            identity: self.runtime.self_id,
            heartbeat: 0,
        };
        self.send(self.runtime.join_addr, &request);

        let join = &mut self.runtime.join;
        join.attempts += 1;
        join.next_attempt_at = self.now + join.backoff;
        self.stats.join_requests_sent += 1;
    }

    fn send(&mut self, dst: NodeIdentity, message: &ProtocolMessage) {
        debug!(
            "[{}] Sending {} to {}",
            self.runtime.self_id,
            message.kind(),
            dst
        );
        self.send_payload(dst, codec::encode(message));
    }

    fn send_payload(&mut self, dst: NodeIdentity, payload: Bytes) {
        self.transport.send(self.runtime.self_id, dst, payload);
        self.stats.messages_sent += 1;
    }
}
