//! Cache Statistics Module
//!
//! Tracks cache performance metrics across both tiers.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Cache Stats ==
/// Process-wide counters shared by every clone of a cache handle.
///
/// Counters only move forward until [`CacheStats::reset`].
#[derive(Debug, Default)]
pub struct CacheStats {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    disk_errors: AtomicU64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a disk operation that failed and was absorbed.
    pub fn record_disk_error(&self) {
        self.disk_errors.fetch_add(1, Ordering::Relaxed);
    }

    // == Reset ==
    /// Sets every counter back to zero.
    pub fn reset(&self) {
        self.memory_hits.store(0, Ordering::Relaxed);
        self.disk_hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.disk_errors.store(0, Ordering::Relaxed);
    }

    // == Counters ==
    /// Reads the counters as `CounterValues`.
    pub fn counters(&self) -> CounterValues {
        CounterValues {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            disk_errors: self.disk_errors.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of the [`CacheStats`] counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterValues {
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub disk_errors: u64,
}

// == Stats Snapshot ==
/// Point-in-time view of the cache, as returned by `TieredCache::stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// Reads served by the memory tier
    pub memory_hits: u64,
    /// Reads served by the disk tier
    pub disk_hits: u64,
    /// Reads served by neither tier, or whose value did not decode as the
    /// requested type
    pub misses: u64,
    /// Calls to `put`
    pub writes: u64,
    /// Memory-tier LRU evictions
    pub evictions: u64,
    /// Disk operations that failed and were absorbed
    pub disk_errors: u64,
    /// (memory_hits + disk_hits) / max(1, lookups)
    pub hit_rate: f64,
    /// Entries currently in the memory tier
    pub memory_size: usize,
    /// Approximate bytes held by the memory tier
    pub memory_bytes: usize,
    /// Rows currently in the disk tier (0 when unavailable)
    pub disk_size: u64,
    /// Whether the disk tier answered the size query
    pub disk_available: bool,
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}

impl StatsSnapshot {
    /// Total number of lookups recorded.
    pub fn lookups(&self) -> u64 {
        self.memory_hits + self.disk_hits + self.misses
    }
}

// == Hit Rate ==
/// Calculates the cache hit rate.
///
/// Returns hits / (hits + misses), or 0.0 if no requests have been made.
pub fn hit_rate(memory_hits: u64, disk_hits: u64, misses: u64) -> f64 {
    let hits = memory_hits + disk_hits;
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.counters(), CounterValues::default());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(hit_rate(0, 0, 0), 0.0);
    }

    #[test]
    fn test_hit_rate_all_hits() {
        assert_eq!(hit_rate(2, 1, 0), 1.0);
    }

    #[test]
    fn test_hit_rate_all_misses() {
        assert_eq!(hit_rate(0, 0, 2), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed_tiers() {
        assert_eq!(hit_rate(1, 1, 2), 0.5);
    }

    #[test]
    fn test_record_and_reset() {
        let stats = CacheStats::new();
        stats.record_memory_hit();
        stats.record_memory_hit();
        stats.record_disk_hit();
        stats.record_miss();
        stats.record_write();
        stats.record_disk_error();

        let counters = stats.counters();
        assert_eq!(counters.memory_hits, 2);
        assert_eq!(counters.disk_hits, 1);
        assert_eq!(counters.misses, 1);
        assert_eq!(counters.writes, 1);
        assert_eq!(counters.disk_errors, 1);

        stats.reset();
        assert_eq!(stats.counters(), CounterValues::default());
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = StatsSnapshot {
            memory_hits: 3,
            disk_hits: 1,
            misses: 4,
            writes: 2,
            evictions: 0,
            disk_errors: 0,
            hit_rate: hit_rate(3, 1, 4),
            memory_size: 2,
            memory_bytes: 10,
            disk_size: 2,
            disk_available: true,
            taken_at: Utc::now(),
        };

        assert_eq!(snapshot.lookups(), 8);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["hit_rate"], 0.5);
        assert!(json["taken_at"].is_string());
    }
}
