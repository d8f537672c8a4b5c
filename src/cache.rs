//! The main cache interface.
//!
//! `Cache` is a cheap-to-clone handle over the shared engine; clones operate
//! on the same underlying data. All operations are synchronous and complete
//! without I/O.

use bytes::Bytes;
use std::sync::Arc;

use crate::config::CacheConfig;
use crate::engine::{AddOutcome, CacheEngine, DeleteOutcome, GetOutcome, InsertOutcome};
use crate::stats::{CacheStats, StatsSnapshot};

/// A sharded, memory-budgeted, thread-safe key/value cache with LRU
/// eviction, CAS updates and lazy expiry.
///
/// # Example
/// ```
/// use memstash::{Cache, CacheConfig, GetOutcome, InsertOutcome};
///
/// let cache = Cache::new(CacheConfig::default());
///
/// let stored = cache.insert("user:1", "0", "", "alice", 0);
/// assert_eq!(stored, InsertOutcome::Stored);
///
/// match cache.get("user:1") {
///     GetOutcome::Found { value, .. } => assert_eq!(&value[..], b"alice"),
///     GetOutcome::NotFound => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Cache {
    engine: Arc<CacheEngine>,
}

impl Cache {
    /// Create a new cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            engine: Arc::new(CacheEngine::new(&config)),
        }
    }

    /// Insert-or-replace. A non-empty `cas_token` makes the store
    /// conditional on the stored token matching.
    ///
    /// `ttl_seconds` of 0 means the entry never expires.
    pub fn insert(
        &self,
        key: impl Into<Bytes>,
        flags: impl Into<Bytes>,
        cas_token: impl Into<Bytes>,
        value: impl Into<Bytes>,
        ttl_seconds: u64,
    ) -> InsertOutcome {
        self.engine.insert(
            key.into(),
            flags.into(),
            cas_token.into(),
            value.into(),
            ttl_seconds,
        )
    }

    /// Store only if no live entry exists for the key.
    pub fn add(
        &self,
        key: impl Into<Bytes>,
        flags: impl Into<Bytes>,
        value: impl Into<Bytes>,
        ttl_seconds: u64,
    ) -> AddOutcome {
        self.engine
            .add(key.into(), flags.into(), value.into(), ttl_seconds)
    }

    /// Look up a key, refreshing its LRU position on a hit.
    pub fn get(&self, key: impl Into<Bytes>) -> GetOutcome {
        self.engine.get(&key.into())
    }

    /// Remove a key. A non-zero grace shortens the entry's expiry instead
    /// of removing it outright.
    pub fn delete(&self, key: impl Into<Bytes>, grace_ttl_seconds: u64) -> DeleteOutcome {
        self.engine.delete(&key.into(), grace_ttl_seconds)
    }

    /// Schedule a bulk invalidation of everything currently stored, taking
    /// effect `delay_seconds` from now.
    pub fn flush_all(&self, delay_seconds: u64) {
        self.engine.schedule_flush(delay_seconds);
    }

    /// Number of entries across all shards. May include dead entries not
    /// yet lazily reaped.
    pub fn len(&self) -> usize {
        self.engine.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate accounted bytes currently charged.
    pub fn accounted_bytes(&self) -> u64 {
        self.engine.accounted_bytes()
    }

    /// The configured memory budget.
    pub fn memory_limit(&self) -> u64 {
        self.engine.memory_limit()
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.engine.stats().snapshot()
    }

    /// The live counters, for integrating with external metrics.
    pub fn stats_ref(&self) -> Arc<CacheStats> {
        self.engine.stats()
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
