//! Canonical market data records.
//!
//! `PriceRecord` is the normalized form of one upstream tick; every
//! downstream stage consumes it. Records are immutable once parsed:
//! cleaning produces a new value, it never mutates in place.

use crate::decimal::Price;
use crate::error::CoreError;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One normalized price tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Trading symbol, e.g. "BTCUSDT".
    pub symbol: String,
    /// Trade/quote price.
    pub price: Price,
    /// Traded volume carried by the tick; zero when the feed omits it.
    #[serde(default)]
    pub volume: Decimal,
    /// Event timestamp as reported upstream.
    pub timestamp: DateTime<Utc>,
    /// Originating feed/exchange identifier.
    pub source: String,
    /// Upstream-reported latency in milliseconds, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
}

impl PriceRecord {
    /// Create a new record with zero volume and no latency.
    pub fn new(
        symbol: impl Into<String>,
        price: Price,
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            volume: Decimal::ZERO,
            timestamp,
            source: source.into(),
            latency_ms: None,
        }
    }

    /// Validate structural invariants shared by parser and processor.
    ///
    /// Rejects empty symbol, non-positive price, empty source, and
    /// timestamps more than `future_grace` ahead of `now`.
    pub fn validate(&self, now: DateTime<Utc>, future_grace: Duration) -> Result<(), CoreError> {
        if self.symbol.trim().is_empty() {
            return Err(CoreError::InvalidSymbol("symbol is empty".to_string()));
        }
        if !self.price.is_positive() {
            return Err(CoreError::InvalidPrice(format!(
                "price must be positive, got {}",
                self.price
            )));
        }
        if self.source.trim().is_empty() {
            return Err(CoreError::InvalidSource("source is empty".to_string()));
        }
        if self.timestamp > now + future_grace {
            return Err(CoreError::InvalidTimestamp(format!(
                "timestamp {} is beyond the future grace period",
                self.timestamp
            )));
        }
        Ok(())
    }

    /// Produce a cleaned copy: trimmed uppercase symbol, price rounded to
    /// `precision` decimals, timestamp clamped to `now` if it sits in the
    /// allowed future grace. The original record is left untouched.
    pub fn cleaned(&self, precision: u32, now: DateTime<Utc>) -> Self {
        let mut out = self.clone();
        out.symbol = self.symbol.trim().to_uppercase();
        out.price = self.price.round_to_precision(precision);
        if out.timestamp > now {
            out.timestamp = now;
        }
        out
    }

    /// Age of the record relative to `now`, in milliseconds.
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_milliseconds()
    }
}

/// Reference metadata for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Trading symbol, e.g. "BTCUSDT".
    pub symbol: String,
    /// Base asset, e.g. "BTC".
    pub base_asset: String,
    /// Quote asset, e.g. "USDT".
    pub quote_asset: String,
    /// Listing status as reported upstream.
    pub status: String,
    /// When this metadata was last refreshed.
    pub updated_at: DateTime<Utc>,
}

impl SymbolInfo {
    pub fn new(
        symbol: impl Into<String>,
        base_asset: impl Into<String>,
        quote_asset: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            base_asset: base_asset.into(),
            quote_asset: quote_asset.into(),
            status: "TRADING".to_string(),
            updated_at: Utc::now(),
        }
    }
}
