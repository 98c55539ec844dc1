//! A membership node: identity, protocol engine, observer hooks and the
//! driver that ticks it.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

pub mod driver;
pub mod engine;
pub mod node_id;
pub mod observer;
pub mod view;

pub use driver::TickDriver;
pub use engine::{EngineStats, NodeRuntimeState, NodeState, ProtocolEngine};
pub use node_id::NodeIdentity;
pub use observer::{MembershipEvent, MembershipObserver, RecordingObserver, TracingObserver};
pub use view::{MemberView, MembershipView};

use crate::error::Result;
use crate::settings::Settings;
use crate::transport::{self, UdpTransport};

/// A UDP-backed node assembled from settings, ready to be run
#[derive(Debug)]
pub struct UdpNode {
    pub identity: NodeIdentity,
    pub driver: TickDriver,
    pub views: watch::Receiver<MembershipView>,
    pub transport: Arc<UdpTransport>,
}

impl UdpNode {
    /// Bind the gossip socket and wire engine, transport and driver together
    pub async fn bind(settings: &Settings, observer: Arc<dyn MembershipObserver>) -> Result<Self> {
        let mut config = settings.protocol_config()?;
        let tick_period: Duration = settings.tick_period()?;

        let (inbox_tx, inbox) = transport::inbox();
        let transport = Arc::new(UdpTransport::bind(settings.gossip_socket_addr()?, inbox_tx).await?);
        // Port 0 binds an ephemeral port; the bound address is the identity
        let identity = transport.local_identity();
        if settings.introducer.is_none() {
            config.introducer = identity;
        }
        info!(
            "[{}] Bound gossip socket, introducer {}",
            identity, config.introducer
        );

        let engine = ProtocolEngine::new(
            identity,
            config,
            inbox,
            Arc::clone(&transport) as Arc<dyn transport::Transport>,
            observer,
        );
        let (driver, views) = TickDriver::new(engine, tick_period);
        Ok(Self {
            identity,
            driver,
            views,
            transport,
        })
    }
}
