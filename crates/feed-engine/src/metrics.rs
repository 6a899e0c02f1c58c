use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Cumulative counters for the feed engine.
///
/// All counters use atomic operations for thread-safe access from spawned
/// load tasks.
#[derive(Debug, Default)]
pub struct FeedMetrics {
    /// Load attempts issued to the engine.
    pub loads_started: AtomicU64,
    /// Loads that reached `Ready`.
    pub loads_succeeded: AtomicU64,
    /// Loads that failed (retriable or permanent).
    pub loads_failed: AtomicU64,
    /// Loads logically cancelled by window exit or teardown.
    pub loads_cancelled: AtomicU64,
    /// Re-attempts after a retriable failure.
    pub retries: AtomicU64,
    /// Ready videos evicted by the governor or window disposal.
    pub evictions: AtomicU64,
    /// Records removed entirely by the retention cap.
    pub records_removed: AtomicU64,
    /// Total bytes admitted to ready state.
    pub bytes_loaded_total: AtomicU64,
    /// High-water mark of the ready byte total.
    pub peak_ready_bytes: AtomicU64,
}

/// Point-in-time copy of [`FeedMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub loads_started: u64,
    pub loads_succeeded: u64,
    pub loads_failed: u64,
    pub loads_cancelled: u64,
    pub retries: u64,
    pub evictions: u64,
    pub records_removed: u64,
    pub bytes_loaded_total: u64,
    pub peak_ready_bytes: u64,
}

impl FeedMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_load_started(&self, is_retry: bool) {
        self.loads_started.fetch_add(1, Ordering::Relaxed);
        if is_retry {
            self.retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_load_succeeded(&self, cost_bytes: u64, ready_bytes: u64) {
        self.loads_succeeded.fetch_add(1, Ordering::Relaxed);
        self.bytes_loaded_total
            .fetch_add(cost_bytes, Ordering::Relaxed);
        self.peak_ready_bytes
            .fetch_max(ready_bytes, Ordering::Relaxed);
    }

    pub fn record_load_failed(&self) {
        self.loads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_cancelled(&self) {
        self.loads_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_record_removed(&self) {
        self.records_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            loads_started: self.loads_started.load(Ordering::Relaxed),
            loads_succeeded: self.loads_succeeded.load(Ordering::Relaxed),
            loads_failed: self.loads_failed.load(Ordering::Relaxed),
            loads_cancelled: self.loads_cancelled.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            records_removed: self.records_removed.load(Ordering::Relaxed),
            bytes_loaded_total: self.bytes_loaded_total.load(Ordering::Relaxed),
            peak_ready_bytes: self.peak_ready_bytes.load(Ordering::Relaxed),
        }
    }

    pub fn log_summary(&self) {
        let snap = self.snapshot();
        info!(
            loads_started = snap.loads_started,
            loads_succeeded = snap.loads_succeeded,
            loads_failed = snap.loads_failed,
            loads_cancelled = snap.loads_cancelled,
            retries = snap.retries,
            evictions = snap.evictions,
            records_removed = snap.records_removed,
            bytes_loaded_total = snap.bytes_loaded_total,
            peak_ready_bytes = snap.peak_ready_bytes,
            "feed engine metrics"
        );
    }
}
