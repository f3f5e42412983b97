//! Trailing time windows and windowed change rates.

use crate::decimal::Price;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed trailing duration over which a change rate is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeWindow {
    secs: u64,
}

impl TimeWindow {
    pub const M1: Self = Self { secs: 60 };
    pub const M5: Self = Self { secs: 300 };
    pub const M15: Self = Self { secs: 900 };

    pub fn from_secs(secs: u64) -> Self {
        Self { secs }
    }

    pub fn as_secs(&self) -> u64 {
        self.secs
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.secs as i64)
    }

    /// Human-readable label: "1m", "5m", "90s".
    pub fn label(&self) -> String {
        if self.secs > 0 && self.secs % 60 == 0 {
            format!("{}m", self.secs / 60)
        } else {
            format!("{}s", self.secs)
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Percentage price movement over one trailing window for one symbol.
///
/// One slot exists per (symbol, window); it is overwritten on every new
/// price event for that symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRate {
    /// Trading symbol.
    pub symbol: String,
    /// Window this rate covers.
    pub window: TimeWindow,
    /// Change rate in percent: `(end - start) / start * 100`.
    pub rate_pct: Decimal,
    /// Price at the window start.
    pub start_price: Price,
    /// Price at the window end (the current price).
    pub end_price: Price,
    /// Timestamp of the price event that produced this rate.
    pub timestamp: DateTime<Utc>,
    /// Whether the rate is within the configured plausibility band.
    pub valid: bool,
    /// Whether the rate exceeds the anomaly threshold. Independent of
    /// `valid`; both flags can be set.
    pub anomalous: bool,
}

impl ChangeRate {
    /// Compute a change rate from window start/end prices.
    ///
    /// Rate is zero when the start price is exactly zero.
    pub fn compute(
        symbol: impl Into<String>,
        window: TimeWindow,
        start_price: Price,
        end_price: Price,
        timestamp: DateTime<Utc>,
        max_change_pct: Decimal,
        anomaly_threshold_pct: Decimal,
    ) -> Self {
        let rate_pct = end_price.pct_from(start_price).unwrap_or(Decimal::ZERO);
        Self {
            symbol: symbol.into(),
            window,
            rate_pct,
            start_price,
            end_price,
            timestamp,
            valid: rate_pct.abs() <= max_change_pct,
            anomalous: rate_pct.abs() > anomaly_threshold_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_window_labels() {
        assert_eq!(TimeWindow::M1.label(), "1m");
        assert_eq!(TimeWindow::M15.label(), "15m");
        assert_eq!(TimeWindow::from_secs(90).label(), "90s");
    }

    #[test]
    fn test_compute_rate() {
        let r = ChangeRate::compute(
            "BTCUSDT",
            TimeWindow::M1,
            Price::new(dec!(100)),
            Price::new(dec!(103)),
            Utc::now(),
            dec!(50),
            dec!(10),
        );
        assert_eq!(r.rate_pct, dec!(3));
        assert!(r.valid);
        assert!(!r.anomalous);
    }

    #[test]
    fn test_zero_start_price_yields_zero_rate() {
        let r = ChangeRate::compute(
            "BTCUSDT",
            TimeWindow::M1,
            Price::ZERO,
            Price::new(dec!(103)),
            Utc::now(),
            dec!(50),
            dec!(10),
        );
        assert_eq!(r.rate_pct, Decimal::ZERO);
        assert!(r.valid);
        assert!(!r.anomalous);
    }

    #[test]
    fn test_flags_are_independent() {
        // 60% move: invalid (>50) and anomalous (>10) at the same time
        let r = ChangeRate::compute(
            "BTCUSDT",
            TimeWindow::M5,
            Price::new(dec!(100)),
            Price::new(dec!(160)),
            Utc::now(),
            dec!(50),
            dec!(10),
        );
        assert!(!r.valid);
        assert!(r.anomalous);

        // 20% move: valid but anomalous
        let r = ChangeRate::compute(
            "BTCUSDT",
            TimeWindow::M5,
            Price::new(dec!(100)),
            Price::new(dec!(120)),
            Utc::now(),
            dec!(50),
            dec!(10),
        );
        assert!(r.valid);
        assert!(r.anomalous);
    }
}
