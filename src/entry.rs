//! Cache entry with the metadata needed for CAS, expiry and LRU tracking.

use bytes::Bytes;
use std::time::{Duration, Instant};

use crate::accounting::estimated_footprint;

/// A single stored item.
///
/// Each entry carries:
/// - The value payload and the client's opaque flags, passed through unmodified
/// - A CAS token, regenerated on every successful mutation
/// - An absolute expiry (`None` is the unbounded sentinel: never expires)
/// - A recency stamp from the global clock, refreshed on every read or write
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) value: Bytes,
    pub(crate) flags: Bytes,
    pub(crate) cas_token: Bytes,
    pub(crate) expires_at: Option<Instant>,
    pub(crate) recency: u64,
}

impl Entry {
    pub(crate) fn new(
        value: Bytes,
        flags: Bytes,
        cas_token: Bytes,
        expires_at: Option<Instant>,
        recency: u64,
    ) -> Self {
        Self {
            value,
            flags,
            cas_token,
            expires_at,
            recency,
        }
    }

    /// Convert a TTL in seconds to an absolute expiry. Zero means no expiry.
    pub(crate) fn expiry_for_ttl(ttl_seconds: u64, now: Instant) -> Option<Instant> {
        if ttl_seconds == 0 {
            None
        } else {
            Some(now + Duration::from_secs(ttl_seconds))
        }
    }

    /// Check if this entry has expired at a given time.
    /// Taking the time as a parameter keeps this testable with a fixed clock.
    pub(crate) fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    /// An entry is live when it is neither expired nor below the flush-epoch
    /// floor. Everything else in the engine treats non-live entries as
    /// already deleted and reaps them lazily.
    pub(crate) fn is_live_at(&self, now: Instant, flush_floor: u64) -> bool {
        !self.is_expired_at(now) && self.recency >= flush_floor
    }

    /// Time left until expiry. `None` for the unbounded sentinel.
    pub(crate) fn remaining_ttl(&self, now: Instant) -> Option<Duration> {
        self.expires_at
            .map(|expires| expires.saturating_duration_since(now))
    }

    /// Approximate accounted size of this entry under the given key.
    pub(crate) fn footprint(&self, key: &[u8]) -> u64 {
        estimated_footprint(key, &self.value, &self.flags, &self.cas_token)
    }
}
