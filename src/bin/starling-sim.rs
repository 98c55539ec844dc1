//! Run a whole membership group in one process and print what every node ends
//! up believing.
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use starling::membership::{MemberStatus, Tick};
use starling::node::{MembershipEvent, NodeIdentity};
use starling::settings::ProtocolConfig;
use starling::simulation::Simulation;
use starling::transport::SimulatedNetwork;

#[derive(Parser)]
#[command(name = "starling-sim")]
#[command(about = "Simulate a Starling group over an in-memory network")]
struct Cli {
    /// Number of nodes; node 1 is the introducer
    #[arg(long, default_value = "10")]
    nodes: u32,

    /// Ticks to run
    #[arg(long, default_value = "100")]
    ticks: Tick,

    /// Ticks between consecutive node starts
    #[arg(long, default_value = "1")]
    join_interval: Tick,

    /// Probability that any one message is lost
    #[arg(long, default_value = "0.0")]
    drop_rate: f64,

    /// Nodes to crash (e.g., "3,7")
    #[arg(long, value_delimiter = ',')]
    crash: Vec<u32>,

    /// Tick at which the crash happens
    #[arg(long, default_value = "40")]
    crash_at: Tick,

    #[arg(long, default_value = "5")]
    fail_timeout: Tick,

    #[arg(long, default_value = "10")]
    cleanup_timeout: Tick,

    #[arg(long, default_value = "3")]
    fanout: usize,

    /// Seed for peer selection and message loss
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Print every node's final view as JSON instead of tables
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "starling=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ProtocolConfig {
        fail_timeout: cli.fail_timeout,
        cleanup_timeout: cli.cleanup_timeout,
        gossip_fanout: cli.fanout,
        ..ProtocolConfig::new(NodeIdentity::ORIGIN_INTRODUCER)
    };
    config.validate()?;

    let network = SimulatedNetwork::lossy(cli.drop_rate, cli.seed);
    let mut sim = Simulation::new(config, network, cli.seed);
    for n in 1..=cli.nodes {
        sim.add_node(Simulation::identity(n));
    }

    let join_interval = cli.join_interval.max(1);
    let crashes: Vec<NodeIdentity> = cli.crash.iter().copied().map(Simulation::identity).collect();
    for now in 0..cli.ticks {
        if now % join_interval == 0 {
            let n = u32::try_from(now / join_interval + 1).unwrap_or(u32::MAX);
            if n <= cli.nodes {
                sim.start(Simulation::identity(n));
            }
        }
        if now == cli.crash_at {
            for identity in &crashes {
                sim.crash(*identity);
            }
        }
        sim.step();
    }

    if cli.json {
        let views: Vec<_> = sim.nodes().map(|engine| engine.view()).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    println!(
        "Simulated {} nodes for {} ticks (drop rate {:.2}, seed {})",
        cli.nodes,
        sim.now(),
        cli.drop_rate,
        cli.seed
    );
    for engine in sim.nodes() {
        let table = engine.table();
        let failed = table
            .iter()
            .filter(|e| e.status == MemberStatus::Failed)
            .count();
        println!(
            "\n{} [{}] heartbeat {} knows {} members ({} failed)",
            engine.self_id(),
            engine.state(),
            table.self_heartbeat(),
            table.len(),
            failed
        );
        for entry in table.iter() {
            println!(
                "    {:<16} hb {:>5}  {:<9} last heard {}",
                entry.identity.to_string(),
                entry.heartbeat,
                entry.status.to_string(),
                entry.last_updated
            );
        }
    }

    let events = sim.observer().events();
    let adds = events
        .iter()
        .filter(|e| matches!(e, MembershipEvent::Added { .. }))
        .count();
    println!(
        "\n{} join events, {} removal events, {} messages sent, {} dropped",
        adds,
        events.len() - adds,
        sim.network().stats().messages_sent,
        sim.network().stats().messages_dropped
    );
    println!("Converged: {}", sim.is_converged());
    Ok(())
}
