//! Engine counters and point-in-time snapshots.
//!
//! Counters are the only authoritative record of item outcomes; the
//! snapshot struct is derived and rebuildable from them at any time.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct LatencyAgg {
    min_ms: f64,
    max_ms: f64,
    total_ms: f64,
    samples: u64,
}

/// Live engine counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    submitted: AtomicU64,
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    deduplicated: AtomicU64,
    merged: AtomicU64,
    batches: AtomicU64,
    batch_items: AtomicU64,
    max_batch_size: AtomicU64,
    buffered_bytes: AtomicU64,
    latency: parking_lot::Mutex<LatencyAgg>,
}

impl EngineStats {
    pub fn record_submitted(&self, count: u64) {
        self.submitted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_success(&self, count: u64) {
        self.succeeded.fetch_add(count, Ordering::Relaxed);
        self.processed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_permanent_failure(&self, count: u64) {
        self.failed.fetch_add(count, Ordering::Relaxed);
        self.processed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_retry(&self, count: u64) {
        self.retried.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_deduplicated(&self, count: u64) {
        self.deduplicated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_merged(&self, count: u64) {
        self.merged.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_batch(&self, size: usize, latency_ms: f64) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.batch_items.fetch_add(size as u64, Ordering::Relaxed);
        self.max_batch_size.fetch_max(size as u64, Ordering::Relaxed);

        let mut agg = self.latency.lock();
        if agg.samples == 0 || latency_ms < agg.min_ms {
            agg.min_ms = latency_ms;
        }
        if latency_ms > agg.max_ms {
            agg.max_ms = latency_ms;
        }
        agg.total_ms += latency_ms;
        agg.samples += 1;
    }

    pub fn add_buffered(&self, bytes: u64) {
        self.buffered_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn sub_buffered(&self, bytes: u64) {
        let mut current = self.buffered_bytes.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(bytes);
            match self.buffered_bytes.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn retried_count(&self) -> u64 {
        self.retried.load(Ordering::Relaxed)
    }

    pub fn succeeded_count(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.submitted.store(0, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.succeeded.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.retried.store(0, Ordering::Relaxed);
        self.deduplicated.store(0, Ordering::Relaxed);
        self.merged.store(0, Ordering::Relaxed);
        self.batches.store(0, Ordering::Relaxed);
        self.batch_items.store(0, Ordering::Relaxed);
        self.max_batch_size.store(0, Ordering::Relaxed);
        *self.latency.lock() = LatencyAgg::default();
    }

    /// Point-in-time snapshot. Racy across fields relative to the exact
    /// instant, internally consistent per field.
    pub fn snapshot(
        &self,
        queue_depth: usize,
        queue_capacity: usize,
        memory_limit_bytes: u64,
    ) -> PersistenceStats {
        let batches = self.batches.load(Ordering::Relaxed);
        let batch_items = self.batch_items.load(Ordering::Relaxed);
        let agg = self.latency.lock();

        PersistenceStats {
            queue_depth,
            queue_capacity,
            submitted: self.submitted.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            merged: self.merged.load(Ordering::Relaxed),
            batches,
            avg_batch_size: if batches == 0 {
                0.0
            } else {
                batch_items as f64 / batches as f64
            },
            max_batch_size: self.max_batch_size.load(Ordering::Relaxed),
            min_latency_ms: agg.min_ms,
            avg_latency_ms: if agg.samples == 0 {
                0.0
            } else {
                agg.total_ms / agg.samples as f64
            },
            max_latency_ms: agg.max_ms,
            memory_bytes: self.buffered_bytes.load(Ordering::Relaxed),
            memory_limit_bytes,
        }
    }
}

/// Derived engine snapshot for external reporting.
#[derive(Debug, Clone)]
pub struct PersistenceStats {
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub submitted: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
    pub deduplicated: u64,
    pub merged: u64,
    pub batches: u64,
    pub avg_batch_size: f64,
    pub max_batch_size: u64,
    pub min_latency_ms: f64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub memory_bytes: u64,
    pub memory_limit_bytes: u64,
}
