//! Prometheus metrics for the tickpipe pipeline.
//!
//! Covers ingestion, processing, the worker pool, and persistence.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration
//! failure means duplicate metric names, a fatal configuration error that
//! should crash at startup rather than fail silently. These panics only
//! occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_int_gauge_vec, CounterVec, Histogram,
    IntGaugeVec,
};

/// Total ticks parsed, by source.
pub static TICKS_PARSED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickpipe_ticks_parsed_total",
        "Total price ticks parsed successfully",
        &["source"]
    )
    .unwrap()
});

/// Total parse rejections, by reason.
pub static PARSE_REJECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickpipe_parse_rejected_total",
        "Total payloads rejected by the parser",
        &["reason"]
    )
    .unwrap()
});

/// Total price anomalies flagged, by symbol.
pub static ANOMALIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickpipe_anomalies_total",
        "Total price ticks flagged anomalous",
        &["symbol"]
    )
    .unwrap()
});

/// Bounded queue depths, by queue (pool/persistence).
pub static QUEUE_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "tickpipe_queue_depth",
        "Current depth of bounded work queues",
        &["queue"]
    )
    .unwrap()
});

/// Worker pool task outcomes.
pub static POOL_TASKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickpipe_pool_tasks_total",
        "Worker pool task outcomes",
        &["outcome"]
    )
    .unwrap()
});

/// Persistence item outcomes (succeeded/failed/retried/deduplicated/merged).
pub static PERSIST_ITEMS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tickpipe_persist_items_total",
        "Persistence item outcomes",
        &["outcome"]
    )
    .unwrap()
});

/// Batch size distribution at flush time.
pub static BATCH_SIZE: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "tickpipe_batch_size",
        "Persistence batch size at flush time",
        vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0]
    )
    .unwrap()
});

/// Flush latency in milliseconds.
pub static FLUSH_LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "tickpipe_flush_latency_ms",
        "Persistence batch flush latency in milliseconds",
        vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 250.0, 500.0, 1000.0]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a parsed tick.
    pub fn tick_parsed(source: &str) {
        TICKS_PARSED_TOTAL.with_label_values(&[source]).inc();
    }

    /// Record a parse rejection.
    pub fn parse_rejected(reason: &str) {
        PARSE_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record an anomalous tick.
    pub fn anomaly(symbol: &str) {
        ANOMALIES_TOTAL.with_label_values(&[symbol]).inc();
    }

    /// Update a queue depth gauge.
    pub fn queue_depth(queue: &str, depth: i64) {
        QUEUE_DEPTH.with_label_values(&[queue]).set(depth);
    }

    /// Record a worker pool task outcome.
    pub fn pool_task(outcome: &str) {
        POOL_TASKS_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record persistence item outcomes in bulk.
    pub fn persist_items(outcome: &str, count: u64) {
        PERSIST_ITEMS_TOTAL
            .with_label_values(&[outcome])
            .inc_by(count as f64);
    }

    /// Record a flushed batch.
    pub fn batch_flushed(size: usize, latency_ms: f64) {
        BATCH_SIZE.observe(size as f64);
        FLUSH_LATENCY_MS.observe(latency_ms);
    }
}
