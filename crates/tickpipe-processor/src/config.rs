//! Processor configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tickpipe_core::TimeWindow;

/// Configuration for the price processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Trailing windows to compute change rates over. Default: 1m/5m/15m.
    #[serde(default = "default_windows")]
    pub windows: Vec<TimeWindow>,
    /// Plausibility band for a change rate, in percent. Default: 50.
    #[serde(default = "default_max_price_change_pct")]
    pub max_price_change_pct: Decimal,
    /// Tick-to-tick and windowed anomaly threshold, in percent. Default: 10.
    #[serde(default = "default_anomaly_threshold_pct")]
    pub anomaly_threshold_pct: Decimal,
    /// How far ahead of the wall clock a timestamp may sit (s). Default: 60.
    #[serde(default = "default_future_grace_secs")]
    pub future_grace_secs: u64,
    /// History entries older than this are pruned (s). Default: 3600.
    #[serde(default = "default_history_retention_secs")]
    pub history_retention_secs: u64,
    /// Cleanup tick interval (s). Default: 60.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Non-positive prices are floored to this during cleaning.
    #[serde(default = "default_price_epsilon")]
    pub price_epsilon: Decimal,
}

fn default_windows() -> Vec<TimeWindow> {
    vec![TimeWindow::M1, TimeWindow::M5, TimeWindow::M15]
}

fn default_max_price_change_pct() -> Decimal {
    Decimal::from(50)
}

fn default_anomaly_threshold_pct() -> Decimal {
    Decimal::from(10)
}

fn default_future_grace_secs() -> u64 {
    60
}

fn default_history_retention_secs() -> u64 {
    3600
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_price_epsilon() -> Decimal {
    Decimal::new(1, 8) // 0.00000001
}

impl ProcessorConfig {
    pub fn future_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.future_grace_secs as i64)
    }

    pub fn history_retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.history_retention_secs as i64)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            max_price_change_pct: default_max_price_change_pct(),
            anomaly_threshold_pct: default_anomaly_threshold_pct(),
            future_grace_secs: default_future_grace_secs(),
            history_retention_secs: default_history_retention_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            price_epsilon: default_price_epsilon(),
        }
    }
}
