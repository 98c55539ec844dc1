//! Starling: decentralized gossip-based group membership.
//!
//! Each node keeps a table of peers with monotonically increasing heartbeat
//! counters, pushes it to a few random peers every tick, and declares a peer
//! failed after a period of silence.
pub mod api;
pub mod cli;
pub mod error;
pub mod membership;
pub mod node;
pub mod protocol;
pub mod settings;
pub mod simulation;
pub mod transport;
