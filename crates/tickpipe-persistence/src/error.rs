//! Persistence error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Persistence queue is full (capacity {0})")]
    QueueFull(usize),

    #[error("Persistence engine is not running")]
    NotRunning,

    #[error("Persistence engine is already running")]
    AlreadyRunning,

    #[error("Writer error: {0}")]
    Writer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;
