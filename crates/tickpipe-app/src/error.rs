//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] tickpipe_feed::ParseError),

    #[error("Pool error: {0}")]
    Pool(#[from] tickpipe_pool::PoolError),

    #[error("Processor error: {0}")]
    Processor(#[from] tickpipe_processor::ProcessorError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] tickpipe_persistence::PersistenceError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tickpipe_telemetry::TelemetryError),
}

pub type AppResult<T> = Result<T, AppError>;
