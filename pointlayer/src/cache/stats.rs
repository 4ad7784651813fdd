//! Cache statistics.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime counters, updated lock-free.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    loads_completed: AtomicU64,
    loads_failed: AtomicU64,
    busy_rejections: AtomicU64,
    aggregates_loaded: AtomicU64,
    aggregates_evicted: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_completed(&self) {
        self.loads_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn load_failed(&self) {
        self.loads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn busy_rejected(&self) {
        self.busy_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn aggregate_loaded(&self) {
        self.aggregates_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn aggregates_evicted(&self, count: usize) {
        self.aggregates_evicted
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Point-in-time view of a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Registered aggregates, loaded or not.
    pub known_aggregates: usize,
    pub loaded_aggregates: usize,
    /// Tiles attached to known aggregates.
    pub tiles: usize,
    pub object_count: usize,

    pub loads_completed: u64,
    pub loads_failed: u64,
    pub busy_rejections: u64,
    pub aggregates_loaded: u64,
    pub aggregates_evicted: u64,
}

impl CacheStats {
    pub(crate) fn with_metrics(mut self, metrics: &CacheMetrics) -> Self {
        self.loads_completed = metrics.loads_completed.load(Ordering::Relaxed);
        self.loads_failed = metrics.loads_failed.load(Ordering::Relaxed);
        self.busy_rejections = metrics.busy_rejections.load(Ordering::Relaxed);
        self.aggregates_loaded = metrics.aggregates_loaded.load(Ordering::Relaxed);
        self.aggregates_evicted = metrics.aggregates_evicted.load(Ordering::Relaxed);
        self
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} aggregates ({} loaded), {} tiles, {} objects; loads {} ok / {} failed, {} busy, {} evicted",
            self.known_aggregates,
            self.loaded_aggregates,
            self.tiles,
            self.object_count,
            self.loads_completed,
            self.loads_failed,
            self.busy_rejections,
            self.aggregates_evicted,
        )
    }
}
