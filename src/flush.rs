//! Lazy bulk invalidation ("flush_all").
//!
//! A flush is recorded as a pending cutover time. `tick` runs on every
//! incoming operation; once the cutover is reached it stamps the current
//! recency as the epoch floor. From then on any entry whose recency is below
//! the floor is considered invalidated, without ever walking the dataset.
//! Dead entries are reaped as they are next touched.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::clock::RecencyClock;

#[derive(Debug)]
pub(crate) struct FlushEpoch {
    /// Fixed base so the cutover instant fits in an atomic as a millisecond
    /// offset.
    base: Instant,
    pending: AtomicBool,
    cutover_ms: AtomicU64,
    /// Recency floor; 0 means no flush has occurred.
    floor: AtomicU64,
}

impl FlushEpoch {
    pub(crate) fn new() -> Self {
        Self {
            base: Instant::now(),
            pending: AtomicBool::new(false),
            cutover_ms: AtomicU64::new(0),
            floor: AtomicU64::new(0),
        }
    }

    /// Schedule a flush to take effect after `delay`.
    pub(crate) fn schedule(&self, delay: Duration) {
        let cutover = self.base.elapsed() + delay;
        // Cutover must be visible before the pending flag.
        self.cutover_ms
            .store(cutover.as_millis() as u64, Ordering::Release);
        self.pending.store(true, Ordering::Release);
    }

    /// Called on every operation. Stamps the epoch floor exactly once when a
    /// pending flush comes due.
    pub(crate) fn tick(&self, clock: &RecencyClock) {
        if !self.pending.load(Ordering::Acquire) {
            return;
        }
        let now_ms = self.base.elapsed().as_millis() as u64;
        if now_ms < self.cutover_ms.load(Ordering::Acquire) {
            return;
        }
        if self
            .pending
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.floor.store(clock.next(), Ordering::Release);
        }
    }

    pub(crate) fn floor(&self) -> u64 {
        self.floor.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flush_floor_is_zero() {
        let flush = FlushEpoch::new();
        let clock = RecencyClock::new();
        flush.tick(&clock);
        assert_eq!(flush.floor(), 0);
    }

    #[test]
    fn test_immediate_flush_stamps_on_next_tick() {
        let flush = FlushEpoch::new();
        let clock = RecencyClock::new();
        let before = clock.next();

        flush.schedule(Duration::ZERO);
        flush.tick(&clock);

        assert!(flush.floor() > before);
    }

    #[test]
    fn test_delayed_flush_waits_for_cutover() {
        let flush = FlushEpoch::new();
        let clock = RecencyClock::new();

        flush.schedule(Duration::from_secs(60));
        flush.tick(&clock);
        assert_eq!(flush.floor(), 0);
    }

    #[test]
    fn test_floor_stamped_once() {
        let flush = FlushEpoch::new();
        let clock = RecencyClock::new();

        flush.schedule(Duration::ZERO);
        flush.tick(&clock);
        let floor = flush.floor();
        clock.next();
        flush.tick(&clock);
        assert_eq!(flush.floor(), floor);
    }
}
