//! The cache engine: sharded storage, admission, eviction and the public
//! operation semantics.
//!
//! Every operation ticks the flush epoch first, routes the key to a shard,
//! and then works the shard's two indices in the canonical order (key index
//! before recency index). No operation holds both of a shard's locks at
//! once.

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::accounting::{estimated_footprint, MemoryAccountant};
use crate::clock::RecencyClock;
use crate::config::CacheConfig;
use crate::entry::Entry;
use crate::eviction::{evict_one_from, EvictOutcome};
use crate::flush::FlushEpoch;
use crate::shard::{route, Shard};
use crate::stats::CacheStats;

/// Outcome of an `insert` (memcached `set`/`cas`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Stored,
    /// A CAS token was supplied but does not match the stored one.
    CasMismatch,
    /// A CAS token was supplied but no live entry exists to compare against.
    CasRequiredButMissing,
    /// No evictable capacity anywhere in the cache.
    MemoryFull,
}

/// Outcome of an `add` (create-if-absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Stored,
    AlreadyExists,
    MemoryFull,
}

/// Outcome of a `get`.
#[derive(Debug, Clone, PartialEq)]
pub enum GetOutcome {
    Found {
        value: Bytes,
        flags: Bytes,
        cas_token: Bytes,
        /// Remaining time to live; `None` means the entry never expires.
        ttl: Option<Duration>,
    },
    NotFound,
}

/// Outcome of a `delete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// What the key-index probe found, captured so the lock can be released
/// between deciding and acting where that is safe.
enum Probe {
    Live {
        cas_matches: bool,
        old_footprint: u64,
        old_recency: u64,
    },
    Dead,
    Missing,
}

#[derive(Debug)]
pub(crate) struct CacheEngine {
    shards: Vec<Shard>,
    clock: RecencyClock,
    accountant: MemoryAccountant,
    flush: FlushEpoch,
    cas_seq: AtomicU64,
    stats: Arc<CacheStats>,
}

impl CacheEngine {
    pub(crate) fn new(config: &CacheConfig) -> Self {
        let shards = (0..config.shard_count).map(|_| Shard::new()).collect();
        Self {
            shards,
            clock: RecencyClock::new(),
            accountant: MemoryAccountant::new(config.memory_limit),
            flush: FlushEpoch::new(),
            cas_seq: AtomicU64::new(1),
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Insert-or-replace with optional optimistic concurrency.
    ///
    /// An empty `cas_token` is an unconditional store. A non-empty token
    /// must match the live entry's token, and requires that a live entry
    /// exists at all.
    pub(crate) fn insert(
        &self,
        key: Bytes,
        flags: Bytes,
        cas_token: Bytes,
        value: Bytes,
        ttl_seconds: u64,
    ) -> InsertOutcome {
        self.flush.tick(&self.clock);

        let fresh_token = self.fresh_cas();
        let new_footprint = estimated_footprint(&key, &value, &flags, &fresh_token);
        let home = route(&key, self.shards.len());
        if !self.make_room(home, new_footprint) {
            return InsertOutcome::MemoryFull;
        }

        let shard = &self.shards[home];
        let now = Instant::now();
        let floor = self.flush.floor();
        let expires_at = Entry::expiry_for_ttl(ttl_seconds, now);

        let mut entries = shard.entries();
        match self.probe(&key, entries.get(&key), &cas_token, now, floor) {
            Probe::Live {
                cas_matches: false,
                ..
            } => InsertOutcome::CasMismatch,
            Probe::Live {
                old_footprint,
                old_recency,
                ..
            } => {
                let recency = self.clock.next();
                if let Some(existing) = entries.get_mut(&key) {
                    existing.value = value;
                    existing.flags = flags;
                    existing.cas_token = fresh_token;
                    existing.expires_at = expires_at;
                    existing.recency = recency;
                }
                drop(entries);
                self.accountant.adjust(old_footprint, new_footprint);
                let mut by_recency = shard.by_recency();
                by_recency.remove(&old_recency);
                by_recency.insert(recency, key);
                drop(by_recency);
                self.stats.record_set();
                InsertOutcome::Stored
            }
            Probe::Dead | Probe::Missing => {
                if !cas_token.is_empty() {
                    return InsertOutcome::CasRequiredButMissing;
                }
                let displaced = entries.remove(&key);
                let recency = self.clock.next();
                entries.insert(
                    key.clone(),
                    Entry::new(value, flags, fresh_token, expires_at, recency),
                );
                drop(entries);
                self.reap_displaced(shard, &key, displaced);
                self.accountant.charge(new_footprint);
                shard.by_recency().insert(recency, key);
                self.stats.record_set();
                InsertOutcome::Stored
            }
        }
    }

    /// Create-if-absent. A dead entry under the key does not count as
    /// existing and is overwritten as a fresh create.
    pub(crate) fn add(
        &self,
        key: Bytes,
        flags: Bytes,
        value: Bytes,
        ttl_seconds: u64,
    ) -> AddOutcome {
        self.flush.tick(&self.clock);

        let fresh_token = self.fresh_cas();
        let new_footprint = estimated_footprint(&key, &value, &flags, &fresh_token);
        let home = route(&key, self.shards.len());
        if !self.make_room(home, new_footprint) {
            return AddOutcome::MemoryFull;
        }

        let shard = &self.shards[home];
        let now = Instant::now();
        let floor = self.flush.floor();
        let expires_at = Entry::expiry_for_ttl(ttl_seconds, now);

        let mut entries = shard.entries();
        match self.probe(&key, entries.get(&key), &[], now, floor) {
            Probe::Live { .. } => AddOutcome::AlreadyExists,
            Probe::Dead | Probe::Missing => {
                let displaced = entries.remove(&key);
                let recency = self.clock.next();
                entries.insert(
                    key.clone(),
                    Entry::new(value, flags, fresh_token, expires_at, recency),
                );
                drop(entries);
                self.reap_displaced(shard, &key, displaced);
                self.accountant.charge(new_footprint);
                shard.by_recency().insert(recency, key);
                self.stats.record_set();
                AddOutcome::Stored
            }
        }
    }

    /// Look up a key. A hit refreshes the entry's recency (read-refresh
    /// LRU); a dead entry found here is removed as a side effect.
    pub(crate) fn get(&self, key: &Bytes) -> GetOutcome {
        self.flush.tick(&self.clock);

        let shard = &self.shards[route(key, self.shards.len())];
        let now = Instant::now();
        let floor = self.flush.floor();

        let mut entries = shard.entries();
        match self.probe(key, entries.get(key), &[], now, floor) {
            Probe::Missing => {
                drop(entries);
                self.stats.record_miss();
                GetOutcome::NotFound
            }
            Probe::Dead => {
                let displaced = entries.remove(key);
                drop(entries);
                self.reap_displaced(shard, key, displaced);
                self.stats.record_miss();
                GetOutcome::NotFound
            }
            Probe::Live { old_recency, .. } => {
                let recency = self.clock.next();
                let mut found = None;
                if let Some(entry) = entries.get_mut(key) {
                    entry.recency = recency;
                    found = Some((
                        entry.value.clone(),
                        entry.flags.clone(),
                        entry.cas_token.clone(),
                        entry.remaining_ttl(now),
                    ));
                }
                drop(entries);
                match found {
                    Some((value, flags, cas_token, ttl)) => {
                        let mut by_recency = shard.by_recency();
                        by_recency.remove(&old_recency);
                        by_recency.insert(recency, key.clone());
                        drop(by_recency);
                        self.stats.record_hit();
                        GetOutcome::Found {
                            value,
                            flags,
                            cas_token,
                            ttl,
                        }
                    }
                    // Unreachable while the lock is held continuously, but
                    // degrade to a miss rather than panic.
                    None => {
                        self.stats.record_miss();
                        GetOutcome::NotFound
                    }
                }
            }
        }
    }

    /// Remove a key. With a non-zero grace the entry is soft-deleted
    /// instead: its expiry is shortened to `now + grace` and it stays
    /// queryable until then (two-phase delete).
    pub(crate) fn delete(&self, key: &Bytes, grace_ttl_seconds: u64) -> DeleteOutcome {
        self.flush.tick(&self.clock);

        let shard = &self.shards[route(key, self.shards.len())];
        let now = Instant::now();
        let floor = self.flush.floor();

        let mut entries = shard.entries();
        match self.probe(key, entries.get(key), &[], now, floor) {
            Probe::Missing => DeleteOutcome::NotFound,
            Probe::Dead => {
                let displaced = entries.remove(key);
                drop(entries);
                self.reap_displaced(shard, key, displaced);
                DeleteOutcome::NotFound
            }
            Probe::Live {
                old_footprint,
                old_recency,
                ..
            } => {
                if grace_ttl_seconds == 0 {
                    entries.remove(key);
                    drop(entries);
                    self.accountant.release(old_footprint);
                    shard.by_recency().remove(&old_recency);
                } else {
                    if let Some(entry) = entries.get_mut(key) {
                        entry.expires_at =
                            Some(now + Duration::from_secs(grace_ttl_seconds));
                    }
                    drop(entries);
                }
                self.stats.record_delete();
                DeleteOutcome::Deleted
            }
        }
    }

    /// Record a bulk invalidation to take effect after `delay_seconds`.
    /// The cutover itself happens on a later operation's tick.
    pub(crate) fn schedule_flush(&self, delay_seconds: u64) {
        debug!(delay_seconds, "flush scheduled");
        self.flush.schedule(Duration::from_secs(delay_seconds));
    }

    pub(crate) fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub(crate) fn accounted_bytes(&self) -> u64 {
        self.accountant.accounted()
    }

    pub(crate) fn memory_limit(&self) -> u64 {
        self.accountant.limit()
    }

    /// Number of entries across all shards, dead ones included until they
    /// are lazily reaped.
    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    fn fresh_cas(&self) -> Bytes {
        let token = self.cas_seq.fetch_add(1, Ordering::Relaxed);
        Bytes::from(token.to_string())
    }

    fn probe(
        &self,
        key: &[u8],
        found: Option<&Entry>,
        cas_token: &[u8],
        now: Instant,
        floor: u64,
    ) -> Probe {
        // Keyed on liveness first: an expired or flushed entry is treated
        // exactly like a missing one, except that the caller reaps it.
        match found {
            Some(entry) if entry.is_live_at(now, floor) => Probe::Live {
                cas_matches: cas_token.is_empty() || entry.cas_token == cas_token,
                old_footprint: entry.footprint(key),
                old_recency: entry.recency,
            },
            Some(_) => Probe::Dead,
            None => Probe::Missing,
        }
    }

    /// Drop a displaced dead entry's recency pair and credit the accountant.
    fn reap_displaced(&self, shard: &Shard, key: &Bytes, displaced: Option<Entry>) {
        if let Some(dead) = displaced {
            self.accountant.release(dead.footprint(key));
            shard.by_recency().remove(&dead.recency);
            self.stats.record_expiration();
        }
    }

    /// Evict until `footprint` is admitted, walking shards round-robin from
    /// the home shard. Returns false only when a full circle found nothing
    /// evictable, meaning the whole cache cannot make room.
    fn make_room(&self, home: usize, footprint: u64) -> bool {
        while !self.accountant.admit(footprint) {
            let floor = self.flush.floor();
            let mut index = home;
            loop {
                match evict_one_from(&self.shards[index], floor, &self.accountant, &self.stats) {
                    EvictOutcome::Evicted => break,
                    EvictOutcome::Nothing => {
                        index = (index + 1) % self.shards.len();
                        if index == home {
                            debug!(footprint, "no evictable entry anywhere");
                            return false;
                        }
                    }
                }
            }
        }
        true
    }
}
