//! In-process metrics collection.
//!
//! Counters accumulate across the whole process (all chunks, all
//! workers); per-chunk accounting lives on the job results instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Histogram for chunk latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 100ms, 500ms, 1s, 5s, 10s, 30s, 1m, 5m, 30m
    buckets: [AtomicU64; 9],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 9] = [100, 500, 1000, 5000, 10000, 30000, 60000, 300000, 1800000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.buckets[Self::BUCKET_BOUNDS.len() - 1].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / count as f64
        }
    }
}

/// Collected metrics for the pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    pub events_processed: Counter,
    pub events_kept: Counter,
    pub duplicates_removed: Counter,
    pub invalid_removed: Counter,

    pub chunks_completed: Counter,
    pub chunks_failed: Counter,
    pub chunk_latency_ms: Histogram,
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub events_processed: u64,
    pub events_kept: u64,
    pub duplicates_removed: u64,
    pub invalid_removed: u64,
    pub chunks_completed: u64,
    pub chunks_failed: u64,
    pub chunk_latency_mean_ms: f64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            events_processed: self.events_processed.get(),
            events_kept: self.events_kept.get(),
            duplicates_removed: self.duplicates_removed.get(),
            invalid_removed: self.invalid_removed.get(),
            chunks_completed: self.chunks_completed.get(),
            chunks_failed: self.chunks_failed.get(),
            chunk_latency_mean_ms: self.chunk_latency_ms.mean(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
