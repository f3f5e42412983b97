//! Parser error types.

use rust_decimal::Decimal;
use thiserror::Error;
use tickpipe_core::CoreError;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Empty payload")]
    EmptyPayload,

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("No usable candidate field for {0}")]
    MissingField(&'static str),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Price {price} outside allowed band [{min}, {max}]")]
    PriceOutOfBand {
        price: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] CoreError),

    #[error("Batch item {index}: {message}")]
    BatchItem { index: usize, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ParseResult<T> = Result<T, ParseError>;
