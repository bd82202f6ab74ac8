//! Cache Statistics Module
//!
//! Tracks store activity: hits, misses, inserts, overwrites and removals.

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Cache Stats ==
/// Tracks store activity counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful retrievals
    pub hits: u64,
    /// Number of retrievals of absent keys
    pub misses: u64,
    /// Number of inserts, including overwrites
    pub inserts: u64,
    /// Number of inserts that replaced an existing entry
    pub overwrites: u64,
    /// Number of explicit removals
    pub removals: u64,
    /// Current number of entries in the store
    pub total_entries: usize,
    /// Current number of stored buffer bytes
    pub total_bytes: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Records an insert; `replaced` is the size of the overwritten entry.
    pub fn record_insert(&mut self, len: usize, replaced: Option<usize>) {
        self.inserts += 1;
        self.total_bytes += len;
        match replaced {
            Some(old_len) => {
                self.overwrites += 1;
                self.total_bytes -= old_len;
            }
            None => self.total_entries += 1,
        }
    }

    pub fn record_removal(&mut self, len: usize) {
        self.removals += 1;
        self.total_entries -= 1;
        self.total_bytes -= len;
    }
}

// == Stats Report ==
/// Timestamped statistics, as reported to hosts.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub taken_at: DateTime<Utc>,
    pub hit_rate: f64,
    #[serde(flatten)]
    pub stats: CacheStats,
}

impl From<CacheStats> for StatsReport {
    fn from(stats: CacheStats) -> Self {
        Self {
            taken_at: Utc::now(),
            hit_rate: stats.hit_rate(),
            stats,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.total_bytes, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_insert_overwrite_accounting() {
        let mut stats = CacheStats::new();
        stats.record_insert(10, None);
        stats.record_insert(4, Some(10));

        assert_eq!(stats.inserts, 2);
        assert_eq!(stats.overwrites, 1);
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_bytes, 4);

        stats.record_removal(4);
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.total_bytes, 0);
    }

    #[test]
    fn test_report_json() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        let report = StatsReport::from(stats);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["hits"], 1);
        assert_eq!(json["hit_rate"], 1.0);
        assert!(json["taken_at"].is_string());
    }
}
