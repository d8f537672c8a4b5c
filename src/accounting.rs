//! Approximate memory accounting for the whole cache.
//!
//! The counter is a best-effort estimate, not an exact byte total. The
//! admission check and the counter updates are not linearized against each
//! other, so concurrent writers can transiently push the total past the
//! configured limit; the next eviction pass brings it back under budget.

use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed structural overhead charged per entry: the recency stamp held in
/// both indices plus the expiry, mirroring the original estimate of
/// `2 * sizeof(timestamp) + sizeof(expiry)`.
pub(crate) const ENTRY_OVERHEAD: u64 = 24;

/// Estimated footprint of one entry.
///
/// The key is counted twice because it is stored in both the key index and
/// the recency index.
pub fn estimated_footprint(key: &[u8], value: &[u8], flags: &[u8], cas_token: &[u8]) -> u64 {
    ENTRY_OVERHEAD
        + 2 * key.len() as u64
        + value.len() as u64
        + flags.len() as u64
        + cas_token.len() as u64
}

/// Process-wide byte counter with an admission check against the configured
/// limit. Updates are relaxed atomics; there is deliberately no lock here.
#[derive(Debug)]
pub(crate) struct MemoryAccountant {
    accounted: AtomicU64,
    limit: u64,
}

impl MemoryAccountant {
    pub(crate) fn new(limit: u64) -> Self {
        Self {
            accounted: AtomicU64::new(0),
            limit,
        }
    }

    /// True iff the candidate would fit under the limit right now.
    /// Check-then-act: racing admits may both pass, bounded overshoot.
    pub(crate) fn admit(&self, candidate_bytes: u64) -> bool {
        self.accounted.load(Ordering::Relaxed) + candidate_bytes < self.limit
    }

    pub(crate) fn charge(&self, bytes: u64) {
        self.accounted.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn release(&self, bytes: u64) {
        self.accounted.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Adjust by the size delta when an entry is replaced in place.
    pub(crate) fn adjust(&self, old_bytes: u64, new_bytes: u64) {
        if new_bytes >= old_bytes {
            self.charge(new_bytes - old_bytes);
        } else {
            self.release(old_bytes - new_bytes);
        }
    }

    pub(crate) fn accounted(&self) -> u64 {
        self.accounted.load(Ordering::Relaxed)
    }

    pub(crate) fn limit(&self) -> u64 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admit_against_limit() {
        let accountant = MemoryAccountant::new(100);
        assert!(accountant.admit(99));
        assert!(!accountant.admit(100));

        accountant.charge(60);
        assert!(accountant.admit(39));
        assert!(!accountant.admit(40));
    }

    #[test]
    fn test_charge_release_roundtrip() {
        let accountant = MemoryAccountant::new(1000);
        accountant.charge(300);
        accountant.release(100);
        assert_eq!(accountant.accounted(), 200);
    }

    #[test]
    fn test_adjust_delta() {
        let accountant = MemoryAccountant::new(1000);
        accountant.charge(100);
        accountant.adjust(100, 150);
        assert_eq!(accountant.accounted(), 150);
        accountant.adjust(150, 80);
        assert_eq!(accountant.accounted(), 80);
    }

    #[test]
    fn test_footprint_counts_key_twice() {
        let short = estimated_footprint(b"a", b"v", b"", b"");
        let longer_key = estimated_footprint(b"ab", b"v", b"", b"");
        assert_eq!(longer_key - short, 2);

        let longer_value = estimated_footprint(b"a", b"vv", b"", b"");
        assert_eq!(longer_value - short, 1);
    }
}
