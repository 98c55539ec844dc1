use std::collections::HashMap;

use indexmap::IndexMap;
use rand::seq::IndexedRandom;
use rand::Rng;

use super::entry::{MemberDigest, MemberStatus, MembershipEntry, Tick};
use crate::node::NodeIdentity;

/// Result of merging one heartbeat observation into the table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Merge {
    /// Identity was unknown and has been added
    Inserted,
    /// Known identity, heartbeat moved forward
    Advanced,
    /// Failed identity came back with a higher heartbeat
    Resurrected,
    /// Heartbeat not above the stored one; nothing changed
    Stale,
    /// Identity was purged recently and the heartbeat is not newer than at purge time
    Tombstoned,
    /// Observation about ourselves; our own counter is only advanced locally
    SelfEntry,
}

impl Merge {
    /// Whether this merge made the identity visible as a (new) live member
    pub fn is_newly_observed(&self) -> bool {
        matches!(self, Merge::Inserted | Merge::Resurrected)
    }
}

#[derive(Clone, Copy, Debug)]
struct Tombstone {
    heartbeat: i64,
    purged_at: Tick,
}

/// Local view of the cluster: one entry per known node, including ourselves.
///
/// Entries live in an `IndexMap` so random peer selection can index into
/// a stable ordering.
#[derive(Clone, Debug)]
pub struct MembershipTable {
    self_id: NodeIdentity,
    entries: IndexMap<NodeIdentity, MembershipEntry>,
    tombstones: HashMap<NodeIdentity, Tombstone>,
}

impl MembershipTable {
    /// Create a table holding only our own entry at heartbeat 0
    pub fn new(self_id: NodeIdentity, now: Tick) -> Self {
        let mut entries = IndexMap::new();
        entries.insert(self_id, MembershipEntry::new(self_id, 0, now));
        Self {
            self_id,
            entries,
            tombstones: HashMap::new(),
        }
    }

    pub fn self_id(&self) -> NodeIdentity {
        self.self_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, identity: &NodeIdentity) -> Option<&MembershipEntry> {
        self.entries.get(identity)
    }

    pub fn contains(&self, identity: &NodeIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MembershipEntry> {
        self.entries.values()
    }

    /// Our own heartbeat counter
    pub fn self_heartbeat(&self) -> i64 {
        self.entries
            .get(&self.self_id)
            .map(|entry| entry.heartbeat)
            .unwrap_or_default()
    }

    /// Number of entries not marked failed, ourselves included
    pub fn live_count(&self) -> usize {
        self.entries.values().filter(|e| !e.is_failed()).count()
    }

    /// Merge a heartbeat observation for `digest.identity`.
    ///
    /// A heartbeat not strictly above the stored one never changes the entry,
    /// so re-delivered or reordered gossip cannot move an entry backwards.
    pub fn upsert(&mut self, digest: &MemberDigest, now: Tick) -> Merge {
        let identity = digest.identity;
        if identity == self.self_id {
            return Merge::SelfEntry;
        }

        if let Some(tombstone) = self.tombstones.get(&identity) {
            if digest.heartbeat <= tombstone.heartbeat {
                return Merge::Tombstoned;
            }
            self.tombstones.remove(&identity);
        }

        match self.entries.get_mut(&identity) {
            None => {
                self.entries
                    .insert(identity, MembershipEntry::new(identity, digest.heartbeat, now));
                Merge::Inserted
            }
            Some(entry) if digest.heartbeat > entry.heartbeat => {
                debug_assert_eq!(entry.identity, identity, "table key/entry mismatch");
                let was_failed = entry.is_failed();
                entry.heartbeat = digest.heartbeat;
                entry.last_updated = now;
                entry.status = MemberStatus::Alive;
                entry.failed_at = None;
                if was_failed {
                    Merge::Resurrected
                } else {
                    Merge::Advanced
                }
            }
            Some(_) => Merge::Stale,
        }
    }

    /// Bump our own heartbeat by one and refresh its timestamp
    pub fn advance_self(&mut self, now: Tick) -> i64 {
        let self_id = self.self_id;
        let entry = self
            .entries
            .entry(self_id)
            .or_insert_with(|| MembershipEntry::new(self_id, 0, now));
        entry.heartbeat += 1;
        entry.last_updated = now;
        entry.status = MemberStatus::Alive;
        entry.heartbeat
    }

    /// Mark alive peers silent for more than `suspect_timeout` ticks as suspected
    pub fn mark_suspected(&mut self, now: Tick, suspect_timeout: Tick) -> Vec<NodeIdentity> {
        let self_id = self.self_id;
        self.entries
            .values_mut()
            .filter(|e| e.identity != self_id && e.status == MemberStatus::Alive)
            .filter(|e| e.silence(now) > suspect_timeout)
            .map(|e| {
                e.status = MemberStatus::Suspected;
                e.identity
            })
            .collect()
    }

    /// Mark peers silent for more than `fail_timeout` ticks as failed.
    ///
    /// Returns only entries that transitioned on this call.
    pub fn mark_timed_out(&mut self, now: Tick, fail_timeout: Tick) -> Vec<NodeIdentity> {
        let self_id = self.self_id;
        self.entries
            .values_mut()
            .filter(|e| e.identity != self_id && !e.is_failed())
            .filter(|e| e.silence(now) > fail_timeout)
            .map(|e| {
                e.status = MemberStatus::Failed;
                e.failed_at = Some(now);
                e.identity
            })
            .collect()
    }

    /// Remove entries failed for more than `cleanup_timeout` ticks.
    ///
    /// Purged identities keep a tombstone for another `cleanup_timeout` ticks
    /// so late gossip carrying their old heartbeat is not re-added.
    pub fn purge_failed(&mut self, now: Tick, cleanup_timeout: Tick) -> Vec<NodeIdentity> {
        self.tombstones
            .retain(|_, t| now.saturating_sub(t.purged_at) <= cleanup_timeout);

        let mut purged = Vec::new();
        let tombstones = &mut self.tombstones;
        self.entries.retain(|identity, entry| match entry.failed_at {
            Some(failed_at) if now.saturating_sub(failed_at) > cleanup_timeout => {
                tombstones.insert(
                    *identity,
                    Tombstone {
                        heartbeat: entry.heartbeat,
                        purged_at: now,
                    },
                );
                purged.push(*identity);
                false
            }
            _ => true,
        });
        purged
    }

    /// Up to `k` distinct peers that are not us and not failed, chosen uniformly
    pub fn sample_gossip_targets<R: Rng + ?Sized>(
        &self,
        k: usize,
        rng: &mut R,
    ) -> Vec<NodeIdentity> {
        let candidates: Vec<NodeIdentity> = self
            .entries
            .values()
            .filter(|e| e.identity != self.self_id && !e.is_failed())
            .map(|e| e.identity)
            .collect();
        candidates.choose_multiple(rng, k).copied().collect()
    }

    /// Forget every peer and tombstone, keeping only our own entry
    pub fn clear_peers(&mut self) {
        let self_id = self.self_id;
        self.entries.retain(|identity, _| *identity == self_id);
        self.tombstones.clear();
    }

    /// Immutable copy of every entry
    pub fn snapshot(&self) -> Vec<MembershipEntry> {
        self.entries.values().cloned().collect()
    }

    /// Wire form of every entry
    pub fn digests(&self) -> Vec<MemberDigest> {
        self.entries.values().map(MembershipEntry::digest).collect()
    }
}
