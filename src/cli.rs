//! CLI for this application
//!
use crate::settings;

#[derive(Clone, Debug, clap::Parser)]
#[command(name = "starling", version, about = "Gossip-style group membership node")]
pub struct Cli {
    // Gossip listen address, also this node's identity
    #[clap(
        long,
        default_value = "127.0.0.1",
        env("STARLING_LISTEN_ADDRESS"),
        help = "IPv4 address to listen on and identify as"
    )]
    pub listen_address: String,

    // UDP listen port for gossip
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_GOSSIP,
        env("STARLING_LISTEN_PORT"),
        help = "UDP port for membership traffic"
    )]
    pub listen_port: u16,

    // HTTP status API listen port
    #[clap(
        long,
        default_value = settings::DEFAULT_PORT_HTTP,
        env("STARLING_API_PORT"),
        help = "Port for the HTTP status API (0 disables it)"
    )]
    pub api_port: u16,

    // Group entry point
    #[clap(
        long,
        env("STARLING_INTRODUCER"),
        help = "Introducer address (ip:port). Omit to found a new group"
    )]
    pub introducer: Option<String>,

    #[clap(
        long,
        default_value = "1000",
        env("STARLING_TICK_PERIOD_MS"),
        help = "Milliseconds between protocol ticks"
    )]
    pub tick_period_ms: u64,

    #[clap(
        long,
        default_value = "5",
        env("STARLING_FAIL_TIMEOUT_TICKS"),
        help = "Ticks of silence before a peer is declared failed"
    )]
    pub fail_timeout_ticks: u64,

    #[clap(
        long,
        env("STARLING_SUSPECT_TIMEOUT_TICKS"),
        help = "Ticks of silence before a peer is suspected (disabled when unset)"
    )]
    pub suspect_timeout_ticks: Option<u64>,

    #[clap(
        long,
        default_value = "10",
        env("STARLING_CLEANUP_TIMEOUT_TICKS"),
        help = "Ticks a failed peer is kept before removal"
    )]
    pub cleanup_timeout_ticks: u64,

    #[clap(
        long,
        default_value = "3",
        env("STARLING_GOSSIP_FANOUT"),
        help = "Peers contacted per tick"
    )]
    pub gossip_fanout: usize,

    #[clap(
        long,
        default_value = "5",
        env("STARLING_JOIN_RETRY_TICKS"),
        help = "Initial ticks to wait for a join reply before retrying"
    )]
    pub join_retry_ticks: u64,

    #[clap(
        long,
        default_value = "5",
        env("STARLING_JOIN_MAX_ATTEMPTS"),
        help = "Join requests sent before giving up (0 retries forever)"
    )]
    pub join_max_attempts: u32,

    #[clap(
        long,
        default_value = "text",
        env("STARLING_LOG_FORMAT"),
        help = "log-format: 'text' or 'json'"
    )]
    pub log_format: settings::LogFormat,
}

impl Cli {
    pub fn into_settings(self) -> settings::Settings {
        settings::Settings {
            listen_address: self.listen_address,
            listen_port: self.listen_port,
            api_port: self.api_port,
            introducer: self.introducer,
            tick_period_ms: self.tick_period_ms,
            fail_timeout_ticks: self.fail_timeout_ticks,
            suspect_timeout_ticks: self.suspect_timeout_ticks,
            cleanup_timeout_ticks: self.cleanup_timeout_ticks,
            gossip_fanout: self.gossip_fanout,
            join_retry_ticks: self.join_retry_ticks,
            join_max_attempts: self.join_max_attempts,
            log_format: self.log_format,
        }
    }
}
