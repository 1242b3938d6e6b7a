//! Per-instance cache counters.
//!
//! Lifetime counters for one [`CacheEngine`](super::CacheEngine), kept in
//! atomics so reading them never takes the engine lock. The per-event history
//! lives in the shared metrics registry; these are the cheap totals.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a cache's counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Current number of entries
    pub size: usize,

    /// Entry limit (`None` for `TimeOnly` caches)
    pub max_entries: Option<usize>,

    /// Reads that returned a valid entry
    pub hits: u64,

    /// Reads that found nothing or an expired entry
    pub misses: u64,

    /// `set` calls, including overwrites
    pub writes: u64,

    /// Entries removed to make room for a new key
    pub evictions: u64,

    /// Entries removed because their TTL elapsed
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate hit rate (hits / total accesses)
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate miss rate (misses / total accesses)
    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }

    /// Calculate fill percentage (size / max_entries)
    pub fn fill_percentage(&self) -> Option<f64> {
        self.max_entries.map(|max| if max == 0 { 0.0 } else { self.size as f64 / max as f64 })
    }

    /// Total number of access operations (hits + misses)
    pub fn total_accesses(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Lock-free counter set behind [`CacheStats`]
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, size: usize, max_entries: Option<usize>) -> CacheStats {
        CacheStats {
            size,
            max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for cache::stats.
    use super::*;

    /// Validates `CacheStats` rate helpers.
    ///
    /// Assertions:
    /// - Ensures `(stats.hit_rate() - 0.8).abs() < 1e-10` evaluates to true.
    /// - Ensures `(stats.miss_rate() - 0.2).abs() < 1e-10` evaluates to true.
    /// - Confirms `stats.total_accesses()` equals `100`.
    #[test]
    fn test_hit_rate_calculation() {
        let stats = CacheStats { hits: 80, misses: 20, ..Default::default() };

        assert!((stats.hit_rate() - 0.8).abs() < 1e-10);
        assert!((stats.miss_rate() - 0.2).abs() < 1e-10);
        assert_eq!(stats.total_accesses(), 100);
    }

    #[test]
    fn test_hit_rate_no_accesses() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.total_accesses(), 0);
    }

    /// Validates `CacheStats::fill_percentage` with and without a limit.
    ///
    /// Assertions:
    /// - Confirms a half-full cache reports `Some(0.5)`.
    /// - Confirms an unbounded cache reports `None`.
    #[test]
    fn test_fill_percentage() {
        let bounded = CacheStats { size: 50, max_entries: Some(100), ..Default::default() };
        assert_eq!(bounded.fill_percentage(), Some(0.5));

        let unbounded = CacheStats { size: 50, max_entries: None, ..Default::default() };
        assert_eq!(unbounded.fill_percentage(), None);
    }

    #[test]
    fn test_counters_snapshot_and_reset() {
        let counters = CacheCounters::default();
        counters.record_hit();
        counters.record_miss();
        counters.record_miss();
        counters.record_write();
        counters.record_eviction();
        counters.record_expirations(3);

        let stats = counters.snapshot(4, Some(10));
        assert_eq!(
            stats,
            CacheStats {
                size: 4,
                max_entries: Some(10),
                hits: 1,
                misses: 2,
                writes: 1,
                evictions: 1,
                expirations: 3,
            }
        );

        counters.reset();
        assert_eq!(counters.snapshot(0, None), CacheStats::default());
    }
}
