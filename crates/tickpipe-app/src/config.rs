//! Application configuration.

use crate::error::AppResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tickpipe_feed::ParserConfig;
use tickpipe_persistence::PersistenceConfig;
use tickpipe_pool::PoolConfig;
use tickpipe_processor::ProcessorConfig;

/// Top-level application configuration.
///
/// Every field has a default, so an empty TOML file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory the bundled JSON Lines writer appends to.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// How often the runtime logs a stats snapshot (s).
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
    /// Parser settings.
    #[serde(default)]
    pub parser: ParserConfig,
    /// Worker pool settings.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Price processor settings.
    #[serde(default)]
    pub processor: ProcessorConfig,
    /// Persistence engine settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_stats_interval_secs() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            stats_interval_secs: default_stats_interval_secs(),
            parser: ParserConfig::default(),
            pool: PoolConfig::default(),
            processor: ProcessorConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}
