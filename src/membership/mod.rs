//! Membership table
//!
//! The authoritative local view of the cluster and the merge rule that keeps
//! it converging: heartbeats only ever move forward, failures are declared
//! locally on timeout, and failed entries are purged after a cleanup delay.
pub mod entry;
pub mod table;

pub use entry::{MemberDigest, MemberStatus, MembershipEntry, Tick};
pub use table::{Merge, MembershipTable};
