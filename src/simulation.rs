//! In-process cluster simulation.
//!
//! Every node runs its own `ProtocolEngine` over a shared `SimulatedNetwork`.
//! Ticks are global: `step` advances logical time by one and ticks each
//! running node in insertion order, so a run is reproducible from its seed.
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::membership::Tick;
use crate::node::{NodeIdentity, NodeState, ProtocolEngine, RecordingObserver};
use crate::settings::ProtocolConfig;
use crate::transport::SimulatedNetwork;

#[derive(Debug)]
pub struct Simulation {
    network: SimulatedNetwork,
    observer: RecordingObserver,
    config: ProtocolConfig,
    nodes: IndexMap<NodeIdentity, ProtocolEngine>,
    crashed: HashSet<NodeIdentity>,
    seed: u64,
    now: Tick,
}

impl Simulation {
    pub fn new(config: ProtocolConfig, network: SimulatedNetwork, seed: u64) -> Self {
        Self {
            network,
            observer: RecordingObserver::new(),
            config,
            nodes: IndexMap::new(),
            crashed: HashSet::new(),
            seed,
            now: 0,
        }
    }

    /// Identity of the `n`th simulated node, 1-based. Node 1 is the origin introducer.
    pub fn identity(n: u32) -> NodeIdentity {
        NodeIdentity::new(n, 0)
    }

    /// Add a node that has not started yet
    pub fn add_node(&mut self, identity: NodeIdentity) {
        let inbox = self.network.register(identity);
        let node_bits = (u64::from(identity.ip()) << 16) | u64::from(identity.port());
        let rng = StdRng::seed_from_u64(self.seed ^ node_bits);
        let engine = ProtocolEngine::new(
            identity,
            self.config.clone(),
            inbox,
            Arc::new(self.network.clone()),
            Arc::new(self.observer.clone()),
        )
        .with_rng(rng);
        self.nodes.insert(identity, engine);
    }

    /// Add nodes `1..=count` and start them all at the current tick
    pub fn with_started_nodes(mut self, count: u32) -> Self {
        for n in 1..=count {
            self.add_node(Self::identity(n));
        }
        self.start_all();
        self
    }

    pub fn start(&mut self, identity: NodeIdentity) {
        if let Some(engine) = self.nodes.get_mut(&identity) {
            engine.start(self.now);
        }
    }

    pub fn start_all(&mut self) {
        let now = self.now;
        for engine in self.nodes.values_mut() {
            engine.start(now);
        }
    }

    /// Stop `identity` without notice: it neither ticks nor receives again
    pub fn crash(&mut self, identity: NodeIdentity) {
        if let Some(engine) = self.nodes.get_mut(&identity) {
            info!("[{}] Crashing node at tick {}", identity, self.now);
            engine.shutdown();
            self.network.crash(identity);
            self.crashed.insert(identity);
        }
    }

    /// Advance one tick on every running node
    pub fn step(&mut self) {
        self.now += 1;
        let now = self.now;
        for (identity, engine) in self.nodes.iter_mut() {
            if !self.crashed.contains(identity) {
                engine.tick(now);
            }
        }
    }

    pub fn run(&mut self, ticks: Tick) {
        for _ in 0..ticks {
            self.step();
        }
    }

    /// Step until `done` holds or `max_ticks` pass; true if `done` was reached
    pub fn run_until<F>(&mut self, max_ticks: Tick, done: F) -> bool
    where
        F: Fn(&Simulation) -> bool,
    {
        for _ in 0..max_ticks {
            if done(self) {
                return true;
            }
            self.step();
        }
        done(self)
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    pub fn node(&self, identity: &NodeIdentity) -> Option<&ProtocolEngine> {
        self.nodes.get(identity)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ProtocolEngine> {
        self.nodes.values()
    }

    pub fn observer(&self) -> &RecordingObserver {
        &self.observer
    }

    pub fn network(&self) -> &SimulatedNetwork {
        &self.network
    }

    pub fn is_crashed(&self, identity: &NodeIdentity) -> bool {
        self.crashed.contains(identity)
    }

    /// Identities that are started and have not crashed
    pub fn running(&self) -> BTreeSet<NodeIdentity> {
        self.nodes
            .values()
            .filter(|e| matches!(e.state(), NodeState::Joining | NodeState::InGroup))
            .map(|e| e.self_id())
            .collect()
    }

    /// Identities `identity` currently holds as not failed, itself included
    pub fn live_view(&self, identity: &NodeIdentity) -> BTreeSet<NodeIdentity> {
        self.nodes
            .get(identity)
            .map(|engine| {
                engine
                    .table()
                    .iter()
                    .filter(|e| !e.is_failed())
                    .map(|e| e.identity)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every running node is in the group and sees exactly the running set
    pub fn is_converged(&self) -> bool {
        let running = self.running();
        running.iter().all(|identity| {
            self.nodes
                .get(identity)
                .map(|e| e.state() == NodeState::InGroup)
                .unwrap_or(false)
                && self.live_view(identity) == running
        })
    }
}
