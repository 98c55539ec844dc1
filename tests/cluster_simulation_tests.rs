use starling::membership::{MemberDigest, MemberStatus, Tick};
use starling::node::{MembershipEvent, NodeIdentity, NodeState};
use starling::protocol::{encode, ProtocolMessage};
use starling::settings::ProtocolConfig;
use starling::simulation::Simulation;
use starling::transport::{SimulatedNetwork, Transport};

fn id(n: u32) -> NodeIdentity {
    Simulation::identity(n)
}

fn config() -> ProtocolConfig {
    ProtocolConfig::new(NodeIdentity::ORIGIN_INTRODUCER)
}

fn simulation(config: ProtocolConfig, nodes: u32) -> Simulation {
    let mut sim = Simulation::new(config, SimulatedNetwork::reliable(), 7);
    for n in 1..=nodes {
        sim.add_node(id(n));
    }
    sim
}

fn status_at(sim: &Simulation, observer: u32, node: u32) -> Option<MemberStatus> {
    sim.node(&id(observer))?
        .table()
        .get(&id(node))
        .map(|entry| entry.status)
}

fn gossip_about(sim: &Simulation, from: u32, to: u32, node: u32, heartbeat: i64) {
    sim.network().send(
        id(from),
        id(to),
        encode(&ProtocolMessage::Gossip {
            entries: vec![MemberDigest::alive(id(node), heartbeat)],
        }),
    );
}

/// Introducer learns the joiner, joiner learns both and enters the group
#[test]
fn test_join_through_introducer() {
    let mut sim = simulation(config(), 2);
    sim.start_all();
    assert_eq!(
        sim.node(&id(1)).unwrap().state(),
        NodeState::InGroup,
        "introducer founds the group"
    );
    assert_eq!(sim.node(&id(2)).unwrap().state(), NodeState::Joining);

    sim.step();

    let introducer = sim.node(&id(1)).unwrap();
    assert!(introducer.table().contains(&id(2)));
    let joiner = sim.node(&id(2)).unwrap();
    assert_eq!(joiner.state(), NodeState::InGroup);
    assert!(joiner.table().contains(&id(1)));
    assert!(joiner.table().contains(&id(2)));
    assert_eq!(sim.observer().adds(id(1), id(2)), 1);
    assert_eq!(sim.observer().adds(id(2), id(1)), 1);
}

/// A late joiner reaches existing members through gossip, logged once each
#[test]
fn test_late_joiner_spreads_by_gossip() {
    let mut sim = simulation(config(), 3);
    sim.start(id(1));
    sim.start(id(2));
    sim.run(2);
    assert!(!sim.node(&id(2)).unwrap().table().contains(&id(3)));

    sim.start(id(3));
    sim.step();

    assert_eq!(sim.node(&id(3)).unwrap().state(), NodeState::InGroup);
    assert_eq!(status_at(&sim, 2, 3), Some(MemberStatus::Alive));
    assert_eq!(sim.observer().adds(id(2), id(3)), 1);

    sim.run(20);
    assert_eq!(sim.observer().adds(id(2), id(3)), 1);
    assert_eq!(sim.observer().adds(id(3), id(2)), 1);
    assert!(sim.is_converged());
}

/// A silent node is failed by every peer, then purged from every table
#[test]
fn test_crashed_node_is_failed_then_purged() {
    let config = config();
    let (fail_timeout, cleanup_timeout) = (config.fail_timeout, config.cleanup_timeout);
    let mut sim = simulation(config, 3);
    sim.start_all();
    sim.run(10);
    assert!(sim.is_converged());

    sim.crash(id(2));
    sim.run(fail_timeout + 2);
    for observer in [1, 3] {
        assert_eq!(status_at(&sim, observer, 2), Some(MemberStatus::Failed));
        assert_eq!(sim.observer().removes(id(observer), id(2)), 1);
    }

    sim.run(cleanup_timeout + 1);
    for observer in [1, 3] {
        assert_eq!(status_at(&sim, observer, 2), None);
        assert_eq!(sim.observer().removes(id(observer), id(2)), 1);
    }
    assert!(sim.is_converged());
}

/// Old heartbeats for a failed node neither refresh nor resurrect it
#[test]
fn test_stale_gossip_does_not_resurrect() {
    let config = config();
    let fail_timeout = config.fail_timeout;
    let mut sim = simulation(config, 3);
    sim.start_all();
    sim.run(10);
    sim.crash(id(2));
    sim.run(fail_timeout + 2);
    assert_eq!(status_at(&sim, 1, 2), Some(MemberStatus::Failed));

    let last_seen = sim.node(&id(1)).unwrap().table().get(&id(2)).unwrap().heartbeat;
    gossip_about(&sim, 3, 1, 2, last_seen - 1);
    gossip_about(&sim, 3, 1, 2, last_seen);
    sim.step();

    assert_eq!(status_at(&sim, 1, 2), Some(MemberStatus::Failed));
    assert_eq!(sim.observer().adds(id(1), id(2)), 1);
    assert_eq!(sim.observer().removes(id(1), id(2)), 1);
}

/// Even once purged, an identity is not re-added from its old heartbeat
#[test]
fn test_purged_node_not_readded_by_stale_gossip() {
    let config = config();
    let (fail_timeout, cleanup_timeout) = (config.fail_timeout, config.cleanup_timeout);
    let mut sim = simulation(config, 3);
    sim.start_all();
    sim.run(10);
    sim.crash(id(2));
    sim.run(fail_timeout + 2);
    let last_seen = sim.node(&id(1)).unwrap().table().get(&id(2)).unwrap().heartbeat;
    sim.run(cleanup_timeout + 1);
    assert_eq!(status_at(&sim, 1, 2), None);

    gossip_about(&sim, 3, 1, 2, last_seen);
    sim.step();
    assert_eq!(status_at(&sim, 1, 2), None);
    assert_eq!(sim.observer().adds(id(1), id(2)), 1);
}

/// A node that really comes back with a newer heartbeat is re-added
#[test]
fn test_fresh_heartbeat_resurrects_failed_node() {
    let config = config();
    let fail_timeout = config.fail_timeout;
    let mut sim = simulation(config, 3);
    sim.start_all();
    sim.run(10);
    sim.crash(id(2));
    sim.run(fail_timeout + 2);

    let last_seen = sim.node(&id(1)).unwrap().table().get(&id(2)).unwrap().heartbeat;
    gossip_about(&sim, 3, 1, 2, last_seen + 5);
    sim.step();

    assert_eq!(status_at(&sim, 1, 2), Some(MemberStatus::Alive));
    assert_eq!(sim.observer().adds(id(1), id(2)), 2);
}

#[test]
fn test_ten_nodes_converge() {
    let mut sim = simulation(config(), 10);
    sim.start_all();
    assert!(sim.run_until(30, Simulation::is_converged));

    for engine in sim.nodes() {
        assert_eq!(engine.table().len(), 10);
        for other in 1..=10 {
            if id(other) != engine.self_id() {
                assert_eq!(sim.observer().adds(engine.self_id(), id(other)), 1);
            }
        }
    }
}

#[test]
fn test_staggered_joins_converge() {
    let mut sim = simulation(config(), 8);
    for n in 1..=8 {
        sim.start(id(n));
        sim.run(3);
    }
    assert!(sim.run_until(30, Simulation::is_converged));
}

/// Steady heartbeats never trigger a removal
#[test]
fn test_no_false_failures_in_healthy_group() {
    let config = ProtocolConfig {
        fail_timeout: 8,
        ..config()
    };
    let mut sim = simulation(config, 8);
    sim.start_all();
    sim.run(200);

    let removals = sim
        .observer()
        .events()
        .into_iter()
        .filter(|e| matches!(e, MembershipEvent::Removed { .. }))
        .count();
    assert_eq!(removals, 0);
    assert!(sim.is_converged());
    for engine in sim.nodes() {
        assert_eq!(engine.table().self_heartbeat(), 200);
    }
}

#[test]
fn test_converges_despite_message_loss() {
    let config = ProtocolConfig {
        fail_timeout: 12,
        cleanup_timeout: 24,
        join_max_attempts: 0,
        ..config()
    };
    let mut sim = Simulation::new(config, SimulatedNetwork::lossy(0.2, 99), 99);
    for n in 1..=8 {
        sim.add_node(id(n));
    }
    sim.start_all();
    sim.run(50);

    assert!(sim.run_until(200, Simulation::is_converged));
    assert!(sim.network().stats().messages_dropped > 0);
}

#[test]
fn test_join_retry_reaches_late_introducer() {
    let config = ProtocolConfig {
        join_retry_ticks: 2,
        ..config()
    };
    let mut sim = simulation(config, 2);
    sim.start(id(2));
    sim.run(4);
    assert_eq!(sim.node(&id(2)).unwrap().state(), NodeState::Joining);

    sim.start(id(1));
    assert!(sim.run_until(20, Simulation::is_converged));
    assert_eq!(sim.observer().adds(id(2), id(1)), 1);
    assert_eq!(sim.observer().adds(id(1), id(2)), 1);
}

#[test]
fn test_unreachable_introducer_fails_bootstrap() {
    let config = ProtocolConfig {
        join_retry_ticks: 1,
        join_max_attempts: 3,
        ..config()
    };
    let mut sim = simulation(config, 2);
    sim.start(id(2));

    let give_up_by: Tick = 1 + 2 + 4 + 1;
    sim.run(give_up_by);
    let joiner = sim.node(&id(2)).unwrap();
    assert_eq!(joiner.state(), NodeState::BootstrapFailed);
    assert_eq!(joiner.stats().join_requests_sent, 3);
    assert!(sim.running().is_empty());
}

#[test]
fn test_same_seed_same_run() {
    let run = || {
        let mut sim = Simulation::new(config(), SimulatedNetwork::lossy(0.1, 5), 5)
            .with_started_nodes(6);
        sim.run(40);
        sim.observer().events()
    };
    assert_eq!(run(), run());
}
