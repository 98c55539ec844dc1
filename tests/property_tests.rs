use proptest::prelude::*;
use starling::membership::{MemberDigest, MemberStatus, MembershipTable, Merge};
use starling::node::NodeIdentity;
use starling::protocol::{decode, encode, encoded_len, ProtocolMessage};

fn identity() -> impl Strategy<Value = NodeIdentity> {
    (any::<u32>(), any::<u16>()).prop_map(|(ip, port)| NodeIdentity::new(ip, port))
}

fn status() -> impl Strategy<Value = MemberStatus> {
    prop_oneof![
        Just(MemberStatus::Alive),
        Just(MemberStatus::Suspected),
        Just(MemberStatus::Failed),
    ]
}

fn digest() -> impl Strategy<Value = MemberDigest> {
    (identity(), any::<i64>(), status()).prop_map(|(identity, heartbeat, status)| MemberDigest {
        identity,
        heartbeat,
        status,
    })
}

fn message() -> impl Strategy<Value = ProtocolMessage> {
    prop_oneof![
        (identity(), any::<i64>()).prop_map(|(identity, heartbeat)| {
            ProtocolMessage::JoinRequest {
                identity,
                heartbeat,
            }
        }),
        prop::collection::vec(digest(), 0..64)
            .prop_map(|entries| ProtocolMessage::JoinReply { entries }),
        prop::collection::vec(digest(), 0..64).prop_map(|entries| ProtocolMessage::Gossip { entries }),
    ]
}

/// A small identity space so sequences hit the same peers repeatedly
fn small_digest() -> impl Strategy<Value = MemberDigest> {
    (2u32..6, 0i64..50).prop_map(|(n, heartbeat)| MemberDigest::alive(NodeIdentity::new(n, 0), heartbeat))
}

proptest! {
    #[test]
    fn test_codec_round_trip_property(message in message()) {
        let bytes = encode(&message);
        prop_assert_eq!(bytes.len(), encoded_len(&message));
        prop_assert_eq!(decode(&bytes), Ok(message));
    }

    #[test]
    fn test_decode_never_panics_property(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode(&data);
    }

    #[test]
    fn test_truncation_always_rejected_property(message in message(), cut in 1usize..16) {
        let bytes = encode(&message);
        let keep = bytes.len().saturating_sub(cut);
        prop_assert!(decode(&bytes[..keep]).is_err());
    }

    #[test]
    fn test_idempotent_merge_property(
        seed in prop::collection::vec(small_digest(), 0..20),
        entry in small_digest(),
        now in 0u64..100,
    ) {
        let mut table = MembershipTable::new(NodeIdentity::new(1, 0), 0);
        for digest in &seed {
            table.upsert(digest, now);
        }

        table.upsert(&entry, now);
        let once = table.snapshot();
        let second = table.upsert(&entry, now + 1);

        prop_assert_eq!(second, Merge::Stale);
        prop_assert_eq!(table.snapshot(), once);
    }

    #[test]
    fn test_heartbeat_monotonic_property(
        updates in prop::collection::vec(small_digest(), 1..100),
    ) {
        let mut table = MembershipTable::new(NodeIdentity::new(1, 0), 0);
        for (now, digest) in updates.iter().enumerate() {
            let before = table.get(&digest.identity).map(|e| e.heartbeat);
            table.upsert(digest, now as u64);
            let after = table.get(&digest.identity).map(|e| e.heartbeat);

            if let (Some(before), Some(after)) = (before, after) {
                prop_assert!(after >= before);
                prop_assert_eq!(after, before.max(digest.heartbeat));
            }
        }
    }

    #[test]
    fn test_gossip_targets_property(
        peers in prop::collection::btree_set(2u32..200, 0..40),
        k in 0usize..10,
        seed in any::<u64>(),
    ) {
        use rand::SeedableRng;

        let self_id = NodeIdentity::new(1, 0);
        let mut table = MembershipTable::new(self_id, 0);
        for n in &peers {
            table.upsert(&MemberDigest::alive(NodeIdentity::new(*n, 0), 1), 0);
        }

        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let targets = table.sample_gossip_targets(k, &mut rng);
        prop_assert_eq!(targets.len(), k.min(peers.len()));
        prop_assert!(!targets.contains(&self_id));

        let mut unique = targets.clone();
        unique.sort();
        unique.dedup();
        prop_assert_eq!(unique.len(), targets.len());
    }
}
