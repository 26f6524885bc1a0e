//! Cache Statistics Module
//!
//! Tracks lookup outcomes and loader activity.

use serde::Serialize;

// == Cache Stats ==
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered with a fresh value
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Lookups that found only an expired value
    pub stale_reads: u64,
    /// Successful loader runs observed by callers
    pub loads: u64,
    /// Failed loader runs observed by callers
    pub load_failures: u64,
    /// Failures answered with a fallback value
    pub fallbacks: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// All counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / lookups, or 0.0 if no lookups have been made.
    /// Stale reads count as lookups that missed.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.stale_reads;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Record Hit ==
    /// Counts a lookup answered with a fresh value.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    // == Record Miss ==
    /// Counts a lookup that found no entry.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Record Stale Read ==
    /// Counts a lookup that found only an expired entry.
    pub fn record_stale_read(&mut self) {
        self.stale_reads += 1;
    }

    // == Record Load ==
    /// Counts a successful loader run seen by a caller.
    pub fn record_load(&mut self) {
        self.loads += 1;
    }

    // == Record Load Failure ==
    /// Counts a failed loader run seen by a caller.
    pub fn record_load_failure(&mut self) {
        self.load_failures += 1;
    }

    // == Record Fallback ==
    /// Counts a failure answered with a fallback value.
    pub fn record_fallback(&mut self) {
        self.fallbacks += 1;
    }

    // == Set Total Entries ==
    /// Updates the entry count snapshot.
    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
