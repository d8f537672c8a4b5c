//! One cache partition: a key index and a recency-ordered index.
//!
//! The two indices are guarded by independent exclusive locks and are never
//! updated atomically as a pair. Callers follow one canonical order, key
//! index before recency index, and tolerate the brief window where the
//! indices disagree: a recency pair pointing at a missing or re-stamped key
//! is treated as already deleted and reaped during eviction.

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};

use crate::entry::Entry;

/// How many trailing key bytes feed the shard router.
const ROUTE_SUFFIX_LEN: usize = 5;

/// Map a key to a shard index.
///
/// Sums the byte values of the last [`ROUTE_SUFFIX_LEN`] bytes of the key
/// (all bytes for shorter keys), modulo the shard count. O(1) and hash-free;
/// distribution is only approximate for adversarial key sets.
///
/// A shard count of zero is coerced to one, matching the config builder.
pub fn route(key: &[u8], shard_count: usize) -> usize {
    let tail = &key[key.len().saturating_sub(ROUTE_SUFFIX_LEN)..];
    let sum: usize = tail.iter().map(|&b| b as usize).sum();
    sum % shard_count.max(1)
}

/// One independent cache partition.
#[derive(Debug, Default)]
pub(crate) struct Shard {
    entries: Mutex<HashMap<Bytes, Entry>>,
    by_recency: Mutex<BTreeMap<u64, Bytes>>,
}

impl Shard {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Lock the key index. Callers keep the guard only for the key-index
    /// phase of an operation and never take the recency lock while holding
    /// this one.
    pub(crate) fn entries(&self) -> MutexGuard<'_, HashMap<Bytes, Entry>> {
        self.entries.lock()
    }

    /// Lock the recency index.
    pub(crate) fn by_recency(&self) -> MutexGuard<'_, BTreeMap<u64, Bytes>> {
        self.by_recency.lock()
    }

    /// The `n` lowest-recency pairs currently in the recency index.
    pub(crate) fn oldest_candidates(&self, n: usize) -> Vec<(u64, Bytes)> {
        self.by_recency
            .lock()
            .iter()
            .take(n)
            .map(|(&recency, key)| (recency, key.clone()))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn entry(recency: u64) -> Entry {
        Entry::new(
            Bytes::from("v"),
            Bytes::from("0"),
            Bytes::from("1"),
            None,
            recency,
        )
    }

    #[test]
    fn test_route_is_deterministic_and_in_range() {
        for key in [&b"a"[..], b"user:123", b"", b"abcdefghij"] {
            let shard = route(key, 4);
            assert!(shard < 4);
            assert_eq!(route(key, 4), shard);
        }
    }

    #[test]
    fn test_route_uses_last_five_bytes() {
        // Same 5-byte suffix must land on the same shard regardless of prefix.
        assert_eq!(route(b"aaaaasuffx", 4), route(b"zzzzzsuffx", 4));
    }

    #[test]
    fn test_route_short_key_uses_all_bytes() {
        assert_eq!(route(b"ab", 4), (b'a' as usize + b'b' as usize) % 4);
    }

    #[test]
    fn test_route_zero_shards_coerced_to_one() {
        assert_eq!(route(b"anything", 0), 0);
        assert_eq!(route(b"", 0), 0);
    }

    #[test]
    fn test_oldest_candidates_in_recency_order() {
        let shard = Shard::new();
        for (recency, key) in [(3u64, "c"), (1, "a"), (2, "b")] {
            let key = Bytes::from(key);
            shard.entries().insert(key.clone(), entry(recency));
            shard.by_recency().insert(recency, key);
        }

        assert_eq!(
            shard.entries().get(b"a".as_ref()).map(|e| e.recency),
            Some(1)
        );
        assert!(shard.entries().get(b"missing".as_ref()).is_none());

        let oldest = shard.oldest_candidates(2);
        assert_eq!(oldest[0], (1, Bytes::from("a")));
        assert_eq!(oldest[1], (2, Bytes::from("b")));
    }

    #[test]
    fn test_indices_lock_independently() {
        // Holding the key-index lock must not block the recency index.
        let shard = Shard::new();
        let entries = shard.entries();
        let by_recency = shard.by_recency();
        assert!(entries.is_empty());
        assert!(by_recency.is_empty());
    }

    #[test]
    fn test_entry_liveness_helper() {
        let e = entry(5);
        assert!(e.is_live_at(Instant::now(), 5));
        assert!(!e.is_live_at(Instant::now(), 6));
    }
}
