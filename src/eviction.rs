//! Victim selection under memory pressure.
//!
//! One eviction pass looks at no more than the two lowest-recency pairs of a
//! shard. A stale pair (key gone or re-stamped since the pair was written)
//! or a dead entry (expired, or below the flush floor) is reclaimed for free
//! and ends the pass. When both candidates are live the one with the larger
//! value payload is evicted, trading strict recency order for more bytes
//! reclaimed per eviction. The caller walks shards round-robin when a
//! shard's recency index is empty.

use bytes::Bytes;
use std::time::Instant;
use tracing::debug;

use crate::accounting::MemoryAccountant;
use crate::shard::Shard;
use crate::stats::CacheStats;

/// Result of one eviction pass on one shard.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum EvictOutcome {
    /// Something was removed; the accountant was credited.
    Evicted,
    /// The shard's recency index is empty; try the next shard.
    Nothing,
}

/// What a recency-index candidate pointed at, as of the classification pass.
enum Candidate {
    /// Pair refers to a key that is gone or has a newer recency stamp.
    Stale,
    /// Entry exists but is expired or flushed.
    Dead,
    /// Entry is live; payload size drives the tie-break.
    Live(usize),
}

pub(crate) fn evict_one_from(
    shard: &Shard,
    flush_floor: u64,
    accountant: &MemoryAccountant,
    stats: &CacheStats,
) -> EvictOutcome {
    let candidates = shard.oldest_candidates(2);
    if candidates.is_empty() {
        return EvictOutcome::Nothing;
    }

    let now = Instant::now();
    let mut classes = Vec::with_capacity(candidates.len());
    {
        let entries = shard.entries();
        for (recency, key) in &candidates {
            let class = match entries.get(key) {
                Some(entry) if entry.recency != *recency => Candidate::Stale,
                Some(entry) if !entry.is_live_at(now, flush_floor) => Candidate::Dead,
                Some(entry) => Candidate::Live(entry.value.len()),
                None => Candidate::Stale,
            };
            classes.push(class);
        }
    }

    // The first stale or dead candidate is a free eviction: no live data lost.
    for ((recency, key), class) in candidates.iter().zip(&classes) {
        match class {
            Candidate::Stale => {
                shard.by_recency().remove(recency);
                debug!(recency, "reaped stale recency pair");
                return EvictOutcome::Evicted;
            }
            Candidate::Dead => {
                if remove_if_current(shard, key, *recency, accountant) {
                    stats.record_expiration();
                }
                shard.by_recency().remove(recency);
                debug!(recency, "reaped dead entry");
                return EvictOutcome::Evicted;
            }
            Candidate::Live(_) => {}
        }
    }

    // All candidates are live: evict the larger payload of the (up to) two
    // oldest; on equal sizes the older one goes.
    let mut victim = 0;
    if let (Some(Candidate::Live(first)), Some(Candidate::Live(second))) =
        (classes.first(), classes.get(1))
    {
        if second > first {
            victim = 1;
        }
    }
    let (recency, key) = &candidates[victim];
    if remove_if_current(shard, key, *recency, accountant) {
        stats.record_eviction();
        debug!(recency, "evicted live entry");
    }
    shard.by_recency().remove(recency);
    EvictOutcome::Evicted
}

/// Remove `key` from the key index if it still carries `recency`, crediting
/// the accountant. Returns false when the entry changed since classification,
/// in which case only the stale pair is dropped by the caller.
fn remove_if_current(
    shard: &Shard,
    key: &Bytes,
    recency: u64,
    accountant: &MemoryAccountant,
) -> bool {
    let mut entries = shard.entries();
    let footprint = match entries.get(key) {
        Some(entry) if entry.recency == recency => entry.footprint(key),
        _ => return false,
    };
    entries.remove(key);
    drop(entries);
    accountant.release(footprint);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use std::time::Duration;

    fn stash(shard: &Shard, key: &str, value: &str, recency: u64, expires_at: Option<Instant>) {
        let key = Bytes::from(key.to_string());
        let entry = Entry::new(
            Bytes::copy_from_slice(value.as_bytes()),
            Bytes::from("0"),
            Bytes::from("1"),
            expires_at,
            recency,
        );
        shard.entries().insert(key.clone(), entry);
        shard.by_recency().insert(recency, key);
    }

    #[test]
    fn test_empty_shard_yields_nothing() {
        let shard = Shard::new();
        let accountant = MemoryAccountant::new(1000);
        let stats = CacheStats::new();
        assert_eq!(
            evict_one_from(&shard, 0, &accountant, &stats),
            EvictOutcome::Nothing
        );
    }

    #[test]
    fn test_stale_pair_is_free_eviction() {
        let shard = Shard::new();
        let accountant = MemoryAccountant::new(1000);
        let stats = CacheStats::new();

        stash(&shard, "live", "payload", 2, None);
        // Orphan pair: no key-index entry behind it.
        shard.by_recency().insert(1, Bytes::from("ghost"));

        assert_eq!(
            evict_one_from(&shard, 0, &accountant, &stats),
            EvictOutcome::Evicted
        );
        // The live entry survived; only the orphan pair went.
        assert!(shard.entries().contains_key(b"live".as_ref()));
        assert_eq!(stats.evictions(), 0);
    }

    #[test]
    fn test_expired_entry_reaped_before_live() {
        let shard = Shard::new();
        let accountant = MemoryAccountant::new(1000);
        let stats = CacheStats::new();

        let past = Instant::now() - Duration::from_secs(1);
        stash(&shard, "old", "x", 1, Some(past));
        stash(&shard, "new", "y", 2, None);
        accountant.charge(100);

        assert_eq!(
            evict_one_from(&shard, 0, &accountant, &stats),
            EvictOutcome::Evicted
        );
        assert!(!shard.entries().contains_key(b"old".as_ref()));
        assert!(shard.entries().contains_key(b"new".as_ref()));
        assert_eq!(stats.expirations(), 1);
    }

    #[test]
    fn test_flushed_entry_reaped_first() {
        let shard = Shard::new();
        let accountant = MemoryAccountant::new(1000);
        let stats = CacheStats::new();

        stash(&shard, "flushed", "x", 1, None);
        stash(&shard, "kept", "y", 5, None);
        accountant.charge(100);

        // Floor of 3 invalidates recency 1 but not 5.
        assert_eq!(
            evict_one_from(&shard, 3, &accountant, &stats),
            EvictOutcome::Evicted
        );
        assert!(!shard.entries().contains_key(b"flushed".as_ref()));
        assert!(shard.entries().contains_key(b"kept".as_ref()));
    }

    #[test]
    fn test_larger_payload_wins_tie_break() {
        let shard = Shard::new();
        let accountant = MemoryAccountant::new(1000);
        let stats = CacheStats::new();

        stash(&shard, "older-small", "x", 1, None);
        stash(&shard, "newer-big", "xxxxxxxxxx", 2, None);
        stash(&shard, "newest", "y", 3, None);
        accountant.charge(300);

        assert_eq!(
            evict_one_from(&shard, 0, &accountant, &stats),
            EvictOutcome::Evicted
        );
        // Between the two oldest live entries the bigger one goes, even
        // though it is more recent.
        assert!(shard.entries().contains_key(b"older-small".as_ref()));
        assert!(!shard.entries().contains_key(b"newer-big".as_ref()));
        assert!(shard.entries().contains_key(b"newest".as_ref()));
        assert_eq!(stats.evictions(), 1);
    }

    #[test]
    fn test_equal_payloads_evict_older() {
        let shard = Shard::new();
        let accountant = MemoryAccountant::new(1000);
        let stats = CacheStats::new();

        stash(&shard, "older", "same", 1, None);
        stash(&shard, "newer", "same", 2, None);
        accountant.charge(100);

        evict_one_from(&shard, 0, &accountant, &stats);
        assert!(!shard.entries().contains_key(b"older".as_ref()));
        assert!(shard.entries().contains_key(b"newer".as_ref()));
    }

    #[test]
    fn test_single_live_entry_evicted() {
        let shard = Shard::new();
        let accountant = MemoryAccountant::new(1000);
        let stats = CacheStats::new();

        stash(&shard, "only", "v", 1, None);
        accountant.charge(50);

        assert_eq!(
            evict_one_from(&shard, 0, &accountant, &stats),
            EvictOutcome::Evicted
        );
        assert_eq!(shard.len(), 0);
        assert_eq!(stats.evictions(), 1);
    }
}
