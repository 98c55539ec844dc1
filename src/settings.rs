//! Starling application settings
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use serde::Serialize;

use crate::config_error;
use crate::error::Result;
use crate::membership::Tick;
use crate::node::NodeIdentity;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT_GOSSIP: u16 = 7946;
pub const DEFAULT_PORT_GOSSIP: &str = "7946";
pub const STANDARD_PORT_HTTP: u16 = 8410;
pub const DEFAULT_PORT_HTTP: &str = "8410";

/// Join backoff never waits longer than this many ticks
pub const MAX_JOIN_BACKOFF_TICKS: Tick = 64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

/// Timing and fan-out knobs of the membership protocol, all in ticks
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProtocolConfig {
    pub introducer: NodeIdentity,
    pub fail_timeout: Tick,
    pub suspect_timeout: Option<Tick>,
    pub cleanup_timeout: Tick,
    pub gossip_fanout: usize,
    pub join_retry_ticks: Tick,
    // 0 retries forever
    pub join_max_attempts: u32,
}

impl ProtocolConfig {
    /// Defaults for a node joining through `introducer`
    pub fn new(introducer: NodeIdentity) -> Self {
        Self {
            introducer,
            fail_timeout: 5,
            suspect_timeout: None,
            cleanup_timeout: 10,
            gossip_fanout: 3,
            join_retry_ticks: 5,
            join_max_attempts: 5,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.gossip_fanout == 0 {
            return Err(config_error!("gossip fanout must be at least 1"));
        }
        if self.fail_timeout == 0 {
            return Err(config_error!("fail timeout must be at least 1 tick"));
        }
        if self.cleanup_timeout == 0 {
            return Err(config_error!("cleanup timeout must be at least 1 tick"));
        }
        if let Some(suspect) = self.suspect_timeout {
            if suspect >= self.fail_timeout {
                return Err(config_error!(
                    "suspect timeout ({}) must be below fail timeout ({})",
                    suspect,
                    self.fail_timeout
                ));
            }
        }
        if self.join_retry_ticks == 0 {
            return Err(config_error!("join retry interval must be at least 1 tick"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Address the gossip socket binds to; doubles as the node identity
    pub listen_address: String,

    // UDP listen port for gossip
    pub listen_port: u16,

    // HTTP status API port, 0 disables the API
    pub api_port: u16,

    // Introducer "ip:port"; None founds a new group
    pub introducer: Option<String>,

    pub tick_period_ms: u64,
    pub fail_timeout_ticks: u64,
    pub suspect_timeout_ticks: Option<u64>,
    pub cleanup_timeout_ticks: u64,
    pub gossip_fanout: usize,
    pub join_retry_ticks: u64,
    pub join_max_attempts: u32,

    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1".to_string(),
            listen_port: STANDARD_PORT_GOSSIP,
            api_port: STANDARD_PORT_HTTP,
            introducer: None,
            tick_period_ms: 1000,
            fail_timeout_ticks: 5,
            suspect_timeout_ticks: None,
            cleanup_timeout_ticks: 10,
            gossip_fanout: 3,
            join_retry_ticks: 5,
            join_max_attempts: 5,
            log_format: LogFormat::Text,
        }
    }
}

impl Settings {
    fn listen_ip(&self) -> Result<Ipv4Addr> {
        let ip: Ipv4Addr = self
            .listen_address
            .parse()
            .map_err(|e| config_error!("Invalid listen address {}: {}", self.listen_address, e))?;
        if ip.is_unspecified() {
            return Err(config_error!(
                "listen address {} cannot identify this node, use a concrete IPv4 address",
                ip
            ));
        }
        Ok(ip)
    }

    /// Identity other members know this node by
    pub fn node_identity(&self) -> Result<NodeIdentity> {
        Ok(SocketAddrV4::new(self.listen_ip()?, self.listen_port).into())
    }

    pub fn gossip_socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.node_identity()?.socket_addr())
    }

    /// Introducer identity, or our own when none is configured
    pub fn introducer_identity(&self) -> Result<NodeIdentity> {
        match &self.introducer {
            Some(addr) => addr.parse(),
            None => self.node_identity(),
        }
    }

    /// HTTP bind address, `None` when the API is disabled
    pub fn api_socket_addr(&self) -> Result<Option<SocketAddr>> {
        if self.api_port == 0 {
            return Ok(None);
        }
        Ok(Some(SocketAddr::new(self.listen_ip()?.into(), self.api_port)))
    }

    pub fn tick_period(&self) -> Result<Duration> {
        if self.tick_period_ms == 0 {
            return Err(config_error!("tick period must be greater than zero"));
        }
        Ok(Duration::from_millis(self.tick_period_ms))
    }

    pub fn protocol_config(&self) -> Result<ProtocolConfig> {
        let config = ProtocolConfig {
            introducer: self.introducer_identity()?,
            fail_timeout: self.fail_timeout_ticks,
            suspect_timeout: self.suspect_timeout_ticks,
            cleanup_timeout: self.cleanup_timeout_ticks,
            gossip_fanout: self.gossip_fanout,
            join_retry_ticks: self.join_retry_ticks,
            join_max_attempts: self.join_max_attempts,
        };
        config.validate()?;
        Ok(config)
    }
}
