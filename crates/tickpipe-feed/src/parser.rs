//! Message parsing for heterogeneous price payloads.
//!
//! Upstream shapes disagree on field names (`symbol` vs `s` vs `pair`),
//! price encoding (number vs numeric string), and timestamp encoding
//! (RFC3339, space-separated, epoch seconds or milliseconds). Extraction
//! is best-effort by priority: the first present, coercible candidate
//! field wins.

use crate::config::ParserConfig;
use crate::error::{ParseError, ParseResult};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tickpipe_core::{Price, PriceRecord};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Epoch values at or above this are treated as milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e10;

/// Parse statistics.
#[derive(Debug, Default)]
pub struct ParseStats {
    /// Payloads parsed into valid records.
    pub parsed_count: AtomicU64,
    /// Payloads rejected by extraction or validation.
    pub rejected_count: AtomicU64,
}

impl ParseStats {
    fn record_parsed(&self) {
        self.parsed_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejected(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn parsed(&self) -> u64 {
        self.parsed_count.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }
}

/// Result of a partial-failure tolerant batch parse.
#[derive(Debug, Default)]
pub struct BatchParseOutcome {
    /// Records that parsed and validated.
    pub records: Vec<PriceRecord>,
    /// Per-item failures collected when `skip_invalid` is set.
    pub warnings: Vec<String>,
}

/// Message parser.
pub struct MessageParser {
    config: ParserConfig,
    stats: ParseStats,
}

impl MessageParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            stats: ParseStats::default(),
        }
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Parse one raw payload into a cleaned, validated record.
    pub fn parse(&self, raw: &[u8]) -> ParseResult<PriceRecord> {
        if raw.is_empty() {
            self.stats.record_rejected();
            return Err(ParseError::EmptyPayload);
        }
        let value: Value = match serde_json::from_slice(raw) {
            Ok(value) => value,
            Err(e) => {
                self.stats.record_rejected();
                return Err(e.into());
            }
        };
        self.parse_value(&value)
    }

    /// Parse one raw payload holding a JSON object or a JSON array of
    /// objects.
    ///
    /// With `skip_invalid` set, per-item failures become warnings in the
    /// outcome; otherwise the first failure fails the whole call.
    pub fn parse_batch(&self, raw: &[u8]) -> ParseResult<BatchParseOutcome> {
        if raw.is_empty() {
            return Err(ParseError::EmptyPayload);
        }
        let value: Value = serde_json::from_slice(raw)?;
        let entries: Vec<&Value> = match &value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(_) => vec![&value],
            _ => return Err(ParseError::NotAnObject),
        };

        let mut outcome = BatchParseOutcome::default();
        for (index, entry) in entries.into_iter().enumerate() {
            match self.parse_value(entry) {
                Ok(record) => outcome.records.push(record),
                Err(e) if self.config.skip_invalid => {
                    warn!(index, error = %e, "Skipping invalid batch item");
                    outcome.warnings.push(format!("item {index}: {e}"));
                }
                Err(e) => {
                    return Err(ParseError::BatchItem {
                        index,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(outcome)
    }

    /// Parse an already-decoded JSON value.
    pub fn parse_value(&self, value: &Value) -> ParseResult<PriceRecord> {
        let result = self.parse_value_inner(value);
        match &result {
            Ok(record) => {
                self.stats.record_parsed();
                debug!(symbol = %record.symbol, price = %record.price, "Parsed tick");
            }
            Err(_) => self.stats.record_rejected(),
        }
        result
    }

    fn parse_value_inner(&self, value: &Value) -> ParseResult<PriceRecord> {
        let obj = value.as_object().ok_or(ParseError::NotAnObject)?;

        let symbol = self
            .first_string(obj, &self.config.symbol_fields)
            .ok_or(ParseError::MissingField("symbol"))?;

        let price_raw = self
            .first_decimal(obj, &self.config.price_fields)
            .ok_or(ParseError::MissingField("price"))?;

        let timestamp = self
            .first_timestamp(obj, &self.config.timestamp_fields)
            .ok_or(ParseError::MissingField("timestamp"))?;

        let source = self
            .first_string(obj, &self.config.source_fields)
            .unwrap_or_else(|| self.config.default_source.clone());

        let volume = self
            .first_decimal(obj, &self.config.volume_fields)
            .unwrap_or(Decimal::ZERO);

        let latency_ms = self
            .first_decimal(obj, &self.config.latency_fields)
            .and_then(|d| d.trunc().to_i64());

        if price_raw < self.config.min_price || price_raw > self.config.max_price {
            return Err(ParseError::PriceOutOfBand {
                price: price_raw,
                min: self.config.min_price,
                max: self.config.max_price,
            });
        }

        let mut record = PriceRecord::new(symbol, Price::new(price_raw), timestamp, source);
        record.volume = volume;
        record.latency_ms = latency_ms;

        let now = Utc::now();
        let grace = Duration::seconds(self.config.future_grace_secs as i64);
        record.validate(now, grace)?;

        Ok(record.cleaned(self.config.price_precision, now))
    }

    /// First candidate field holding a non-empty string.
    fn first_string(
        &self,
        obj: &serde_json::Map<String, Value>,
        candidates: &[String],
    ) -> Option<String> {
        for name in candidates {
            if let Some(v) = obj.get(name) {
                match v {
                    Value::String(s) if !s.trim().is_empty() => return Some(s.clone()),
                    _ => continue,
                }
            }
        }
        None
    }

    /// First candidate field coercible to a decimal (number or numeric
    /// string).
    fn first_decimal(
        &self,
        obj: &serde_json::Map<String, Value>,
        candidates: &[String],
    ) -> Option<Decimal> {
        for name in candidates {
            if let Some(d) = obj.get(name).and_then(coerce_decimal) {
                return Some(d);
            }
        }
        None
    }

    /// First candidate field coercible to a timestamp.
    fn first_timestamp(
        &self,
        obj: &serde_json::Map<String, Value>,
        candidates: &[String],
    ) -> Option<DateTime<Utc>> {
        for name in candidates {
            if let Some(ts) = obj.get(name).and_then(coerce_timestamp) {
                return Some(ts);
            }
        }
        None
    }
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new(ParserConfig::default())
    }
}

fn coerce_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Coerce a JSON value into a UTC timestamp.
///
/// Accepts RFC3339 (with or without offset), the space-separated
/// `%Y-%m-%d %H:%M:%S` fallback, or a raw Unix epoch. Epoch seconds vs
/// milliseconds are disambiguated by magnitude. Zero epochs are rejected.
fn coerce_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => coerce_epoch(n.as_f64()?),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(Utc.from_utc_datetime(&naive));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(Utc.from_utc_datetime(&naive));
            }
            coerce_epoch(s.parse::<f64>().ok()?)
        }
        _ => None,
    }
}

fn coerce_epoch(epoch: f64) -> Option<DateTime<Utc>> {
    if epoch <= 0.0 {
        return None;
    }
    if epoch >= EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(epoch as i64)
    } else {
        DateTime::from_timestamp(epoch as i64, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn parser() -> MessageParser {
        MessageParser::default()
    }

    fn recent_epoch() -> i64 {
        Utc::now().timestamp() - 5
    }

    #[test]
    fn test_parse_canonical_fields() {
        let p = parser();
        let raw = json!({
            "symbol": "BTCUSDT",
            "price": 50000.5,
            "timestamp": recent_epoch(),
            "source": "binance",
        });

        let record = p.parse(raw.to_string().as_bytes()).unwrap();
        assert_eq!(record.symbol, "BTCUSDT");
        assert_eq!(record.price.inner(), dec!(50000.5));
        assert_eq!(record.source, "binance");
        assert_eq!(p.stats().parsed(), 1);
    }

    #[test]
    fn test_field_priority_first_candidate_wins() {
        let p = parser();
        // Both "symbol" and "s" present: "symbol" has priority
        let raw = json!({
            "symbol": "BTCUSDT",
            "s": "ETHUSDT",
            "p": "123.45",
            "ts": recent_epoch(),
        });

        let record = p.parse(raw.to_string().as_bytes()).unwrap();
        assert_eq!(record.symbol, "BTCUSDT");
        assert_eq!(record.price.inner(), dec!(123.45));
        assert_eq!(record.source, "unknown");
    }

    #[test]
    fn test_short_field_names() {
        let p = parser();
        let raw = json!({
            "s": "ethusdt",
            "c": "1800.123456789",
            "E": recent_epoch() * 1000,
            "q": "12.5",
        });

        let record = p.parse(raw.to_string().as_bytes()).unwrap();
        assert_eq!(record.symbol, "ETHUSDT");
        // cleaned to 8 decimals
        assert_eq!(record.price.inner(), dec!(1800.12345679));
        assert_eq!(record.volume, dec!(12.5));
    }

    #[test]
    fn test_numeric_string_price() {
        let p = parser();
        let raw = json!({
            "symbol": "BTCUSDT",
            "price": "42000.00",
            "timestamp": recent_epoch(),
        });
        let record = p.parse(raw.to_string().as_bytes()).unwrap();
        assert_eq!(record.price.inner(), dec!(42000.00));
    }

    #[test]
    fn test_rfc3339_timestamp() {
        let p = parser();
        let raw = json!({
            "symbol": "BTCUSDT",
            "price": 100,
            "time": "2024-06-01T12:30:00Z",
        });
        let record = p.parse(raw.to_string().as_bytes()).unwrap();
        assert_eq!(record.timestamp.to_rfc3339(), "2024-06-01T12:30:00+00:00");
    }

    #[test]
    fn test_space_separated_timestamp() {
        let p = parser();
        let raw = json!({
            "symbol": "BTCUSDT",
            "price": 100,
            "time": "2024-06-01 12:30:00",
        });
        let record = p.parse(raw.to_string().as_bytes()).unwrap();
        assert_eq!(record.timestamp.timestamp(), 1717245000);
    }

    #[test]
    fn test_epoch_magnitude_disambiguation() {
        // 1717245000 < 1e10: seconds
        assert_eq!(
            coerce_epoch(1_717_245_000.0).unwrap().timestamp(),
            1_717_245_000
        );
        // 1717245000123 >= 1e10: milliseconds
        assert_eq!(
            coerce_epoch(1_717_245_000_123.0).unwrap().timestamp_millis(),
            1_717_245_000_123
        );
    }

    #[test]
    fn test_zero_timestamp_rejected() {
        let p = parser();
        let raw = json!({
            "symbol": "BTCUSDT",
            "price": 100,
            "timestamp": 0,
        });
        let err = p.parse(raw.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::MissingField("timestamp")));
        assert_eq!(p.stats().rejected(), 1);
    }

    #[test]
    fn test_missing_symbol_rejected() {
        let p = parser();
        let raw = json!({ "price": 100, "timestamp": recent_epoch() });
        let err = p.parse(raw.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::MissingField("symbol")));
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let p = parser();
        let raw = json!({
            "symbol": "BTCUSDT",
            "price": -5,
            "timestamp": recent_epoch(),
        });
        assert!(p.parse(raw.to_string().as_bytes()).is_err());
    }

    #[test]
    fn test_price_band_rejected() {
        let p = parser();
        let raw = json!({
            "symbol": "BTCUSDT",
            "price": 10_000_000_000.0_f64,
            "timestamp": recent_epoch(),
        });
        let err = p.parse(raw.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::PriceOutOfBand { .. }));
    }

    #[test]
    fn test_far_future_timestamp_rejected() {
        let p = parser();
        let raw = json!({
            "symbol": "BTCUSDT",
            "price": 100,
            "timestamp": Utc::now().timestamp() + 3600,
        });
        assert!(p.parse(raw.to_string().as_bytes()).is_err());
    }

    #[test]
    fn test_batch_skip_invalid_collects_warnings() {
        let p = parser();
        let raw = json!([
            { "symbol": "BTCUSDT", "price": 100, "timestamp": recent_epoch() },
            { "symbol": "", "price": 100, "timestamp": recent_epoch() },
            { "symbol": "ETHUSDT", "price": 2000, "timestamp": recent_epoch() },
        ]);

        let outcome = p.parse_batch(raw.to_string().as_bytes()).unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].starts_with("item 1:"));
    }

    #[test]
    fn test_batch_strict_mode_fails_whole_call() {
        let mut config = ParserConfig::default();
        config.skip_invalid = false;
        let p = MessageParser::new(config);

        let raw = json!([
            { "symbol": "BTCUSDT", "price": 100, "timestamp": recent_epoch() },
            { "price": 100, "timestamp": recent_epoch() },
        ]);

        let err = p.parse_batch(raw.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ParseError::BatchItem { index: 1, .. }));
    }

    #[test]
    fn test_round_trip_parse() {
        let p = parser();
        let raw = json!({
            "symbol": "BTCUSDT",
            "price": "50123.456",
            "timestamp": recent_epoch(),
            "source": "binance",
            "volume": "3.25",
        });

        let first = p.parse(raw.to_string().as_bytes()).unwrap();
        let serialized = serde_json::to_vec(&first).unwrap();
        let second = p.parse(&serialized).unwrap();

        assert_eq!(first.symbol, second.symbol);
        assert_eq!(first.price, second.price);
        assert_eq!(first.timestamp, second.timestamp);
        assert_eq!(first.volume, second.volume);
        assert_eq!(first.source, second.source);
    }
}
