//! Worker pool error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Worker pool is already running")]
    AlreadyRunning,

    #[error("Worker pool is not running")]
    NotRunning,

    #[error("Task queue is full (capacity {0})")]
    QueueFull(usize),
}

pub type PoolResult<T> = Result<T, PoolError>;
