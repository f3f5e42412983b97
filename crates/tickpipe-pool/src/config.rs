//! Worker pool configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of worker tasks. Default: 4.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Bounded task queue capacity. Default: 1000.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// Per-task execution timeout (ms). Default: 30,000.
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
    /// Maximum in-pool retries per task. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay before a failed task is re-enqueued (ms). Default: 1000.
    /// Persistence-layer retries use exponential backoff instead; this one
    /// stays flat.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// How long `stop` waits for in-flight work to drain (ms). Default: 5000.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_workers() -> usize {
    4
}

fn default_queue_size() -> usize {
    1000
}

fn default_task_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

impl PoolConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_size: default_queue_size(),
            task_timeout_ms: default_task_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}
