//! Parser configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Configuration for field extraction, validation, and cleaning.
///
/// Each logical field has a priority-ordered list of acceptable source
/// field names; the first present, coercible value wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Candidate field names for the symbol.
    #[serde(default = "default_symbol_fields")]
    pub symbol_fields: Vec<String>,
    /// Candidate field names for the price.
    #[serde(default = "default_price_fields")]
    pub price_fields: Vec<String>,
    /// Candidate field names for the event timestamp.
    #[serde(default = "default_timestamp_fields")]
    pub timestamp_fields: Vec<String>,
    /// Candidate field names for the source.
    #[serde(default = "default_source_fields")]
    pub source_fields: Vec<String>,
    /// Candidate field names for the volume.
    #[serde(default = "default_volume_fields")]
    pub volume_fields: Vec<String>,
    /// Candidate field names for upstream latency.
    #[serde(default = "default_latency_fields")]
    pub latency_fields: Vec<String>,
    /// Source recorded when the payload names none.
    #[serde(default = "default_source")]
    pub default_source: String,
    /// Lower bound of the accepted price band.
    #[serde(default = "default_min_price")]
    pub min_price: Decimal,
    /// Upper bound of the accepted price band.
    #[serde(default = "default_max_price")]
    pub max_price: Decimal,
    /// Decimal places kept after cleaning.
    #[serde(default = "default_price_precision")]
    pub price_precision: u32,
    /// How far ahead of the wall clock a timestamp may sit.
    #[serde(default = "default_future_grace_secs")]
    pub future_grace_secs: u64,
    /// Collect per-item batch failures as warnings instead of failing the
    /// whole batch call.
    #[serde(default = "default_skip_invalid")]
    pub skip_invalid: bool,
}

fn default_symbol_fields() -> Vec<String> {
    ["symbol", "s", "pair", "instrument"]
        .map(String::from)
        .to_vec()
}

fn default_price_fields() -> Vec<String> {
    ["price", "p", "last", "close", "c"]
        .map(String::from)
        .to_vec()
}

fn default_timestamp_fields() -> Vec<String> {
    ["timestamp", "ts", "time", "t", "event_time", "E"]
        .map(String::from)
        .to_vec()
}

fn default_source_fields() -> Vec<String> {
    ["source", "exchange", "venue"].map(String::from).to_vec()
}

fn default_volume_fields() -> Vec<String> {
    ["volume", "v", "qty", "quantity", "q"]
        .map(String::from)
        .to_vec()
}

fn default_latency_fields() -> Vec<String> {
    ["latency_ms", "latency"].map(String::from).to_vec()
}

fn default_source() -> String {
    "unknown".to_string()
}

fn default_min_price() -> Decimal {
    Decimal::new(1, 8) // 0.00000001
}

fn default_max_price() -> Decimal {
    Decimal::new(1_000_000_000, 0)
}

fn default_price_precision() -> u32 {
    8
}

fn default_future_grace_secs() -> u64 {
    60
}

fn default_skip_invalid() -> bool {
    true
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            symbol_fields: default_symbol_fields(),
            price_fields: default_price_fields(),
            timestamp_fields: default_timestamp_fields(),
            source_fields: default_source_fields(),
            volume_fields: default_volume_fields(),
            latency_fields: default_latency_fields(),
            default_source: default_source(),
            min_price: default_min_price(),
            max_price: default_max_price(),
            price_precision: default_price_precision(),
            future_grace_secs: default_future_grace_secs(),
            skip_invalid: default_skip_invalid(),
        }
    }
}
