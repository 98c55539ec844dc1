//! Tick Driver
//!
//! Calls the engine once per tick period on a tokio interval and publishes a
//! fresh `MembershipView` after every tick. The engine itself never sees wall
//! clock time; the driver counts ticks.
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::info;

use super::engine::{NodeState, ProtocolEngine};
use super::view::MembershipView;
use crate::error::{Result, StarlingError};
use crate::membership::Tick;

#[derive(Debug)]
pub struct TickDriver {
    engine: ProtocolEngine,
    tick_period: Duration,
    view_tx: watch::Sender<MembershipView>,
}

impl TickDriver {
    /// Wrap `engine`; the receiver sees a new view after every tick
    pub fn new(
        engine: ProtocolEngine,
        tick_period: Duration,
    ) -> (Self, watch::Receiver<MembershipView>) {
        let (view_tx, view_rx) = watch::channel(engine.view());
        (
            Self {
                engine,
                tick_period,
                view_tx,
            },
            view_rx,
        )
    }

    pub fn subscribe(&self) -> watch::Receiver<MembershipView> {
        self.view_tx.subscribe()
    }

    /// Start the engine and tick until `shutdown` flips to true or its sender
    /// is dropped.
    ///
    /// Returns the final view, or `StarlingError::Bootstrap` when the
    /// introducer never answered.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<MembershipView> {
        let self_id = self.engine.self_id();
        let mut now: Tick = 0;
        self.engine.start(now);
        self.publish();

        let mut interval = time::interval(self.tick_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    now += 1;
                    self.engine.tick(now);
                    self.publish();

                    if self.engine.state() == NodeState::BootstrapFailed {
                        return Err(StarlingError::Bootstrap(format!(
                            "{} could not join via {} after {} attempts",
                            self_id,
                            self.engine.config().introducer,
                            self.engine.config().join_max_attempts
                        )));
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.engine.shutdown();
        self.publish();
        info!("[{}] Tick driver stopped at tick {}", self_id, now);
        Ok(self.engine.view())
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.engine.view());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::node::observer::RecordingObserver;
    use crate::node::NodeIdentity;
    use crate::settings::ProtocolConfig;
    use crate::transport::SimulatedNetwork;

    fn engine(network: &SimulatedNetwork, n: u32, config: ProtocolConfig) -> ProtocolEngine {
        let identity = NodeIdentity::new(n, 0);
        ProtocolEngine::new(
            identity,
            config,
            network.register(identity),
            Arc::new(network.clone()),
            Arc::new(RecordingObserver::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_ticks_and_stops() {
        let network = SimulatedNetwork::reliable();
        let introducer = NodeIdentity::new(1, 0);
        let engine = engine(&network, 1, ProtocolConfig::new(introducer));
        let (driver, views) = TickDriver::new(engine, Duration::from_millis(100));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(driver.run(shutdown_rx));
        time::sleep(Duration::from_millis(550)).await;
        assert_eq!(views.borrow().state, NodeState::InGroup);
        shutdown_tx.send(true).unwrap();

        let last = handle.await.unwrap().unwrap();
        assert_eq!(last.state, NodeState::Stopped);
        assert_eq!(last.tick, 5);
        assert_eq!(last.heartbeat, 5);
        assert_eq!(views.borrow().state, NodeState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_reports_bootstrap_failure() {
        let network = SimulatedNetwork::reliable();
        let config = ProtocolConfig {
            join_retry_ticks: 1,
            join_max_attempts: 2,
            ..ProtocolConfig::new(NodeIdentity::new(1, 0))
        };
        let engine = engine(&network, 2, config);
        let (driver, _views) = TickDriver::new(engine, Duration::from_millis(10));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let result = driver.run(shutdown_rx).await;
        assert!(matches!(result, Err(StarlingError::Bootstrap(_))));
    }
}
