//! The global recency clock.
//!
//! A single process-wide counter issues every recency value in the engine,
//! so recencies are unique and strictly increasing across all shards. That
//! makes the flush-epoch comparison meaningful cache-wide even though the
//! indices themselves are partitioned.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic logical clock shared by every shard.
///
/// Initialized once at engine startup and never reset.
#[derive(Debug, Default)]
pub(crate) struct RecencyClock {
    counter: AtomicU64,
}

impl RecencyClock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Issue the next recency value.
    ///
    /// The first value issued is 1, so a flush-epoch floor of 0 always means
    /// "no flush has occurred" and never invalidates a live entry.
    pub(crate) fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}
