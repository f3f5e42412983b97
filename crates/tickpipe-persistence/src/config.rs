//! Persistence engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the persistence engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Bounded submission queue capacity. Default: 10,000.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Flush once this many items are pending. Default: 50.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Flush pending items after this long regardless of count (ms).
    /// Default: 5000. Keeps low-volume streams from starving.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
    /// Retry ceiling per item. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base retry delay (ms). Default: 1000.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Backoff multiplier applied per retry. Default: 2.0.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: f64,
    /// Upper bound on any single retry delay (ms). Default: 30,000.
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    /// Drop duplicate items seen within the dedup window. Default: true.
    #[serde(default = "default_dedup_enabled")]
    pub dedup_enabled: bool,
    /// Time span within which equal fingerprints are duplicates (ms).
    /// Default: 30,000.
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,
    /// Validate batch items before writing. Default: true.
    #[serde(default = "default_integrity_check")]
    pub integrity_check: bool,
    /// Buffered-memory ceiling reported in stats (bytes). Default: 64 MiB.
    #[serde(default = "default_memory_limit_bytes")]
    pub memory_limit_bytes: u64,
    /// How long `shutdown` waits for the final flush (ms). Default: 5000.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_queue_size() -> usize {
    10_000
}

fn default_batch_size() -> usize {
    50
}

fn default_batch_timeout_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_interval_ms() -> u64 {
    1000
}

fn default_retry_backoff() -> f64 {
    2.0
}

fn default_max_retry_delay_ms() -> u64 {
    30_000
}

fn default_dedup_enabled() -> bool {
    true
}

fn default_dedup_window_ms() -> u64 {
    30_000
}

fn default_integrity_check() -> bool {
    true
}

fn default_memory_limit_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

impl PersistenceConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            max_retries: default_max_retries(),
            retry_interval_ms: default_retry_interval_ms(),
            retry_backoff: default_retry_backoff(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            dedup_enabled: default_dedup_enabled(),
            dedup_window_ms: default_dedup_window_ms(),
            integrity_check: default_integrity_check(),
            memory_limit_bytes: default_memory_limit_bytes(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}
