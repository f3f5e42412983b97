//! Processor error types.

use thiserror::Error;
use tickpipe_core::CoreError;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] CoreError),
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;
