//! tickpipe - market tick ingestion, analytics, and persistence.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tickpipe_app::{AppConfig, Pipeline};
use tickpipe_persistence::JsonLinesWriter;
use tracing::info;

/// Market tick ingestion, windowed analytics, and durable persistence.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TICKPIPE_CONFIG).
    #[arg(short, long)]
    config: Option<String>,

    /// Override the output directory for the JSON Lines writer.
    #[arg(long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tickpipe_telemetry::init_logging()?;
    info!("Starting tickpipe v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args
        .config
        .or_else(|| std::env::var("TICKPIPE_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let mut config = if std::path::Path::new(&config_path).exists() {
        info!(config_path = %config_path, "Loading configuration");
        AppConfig::from_file(&config_path)?
    } else {
        info!(config_path = %config_path, "Config file not found, using defaults");
        AppConfig::default()
    };
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    let writer = Arc::new(JsonLinesWriter::new(&config.data_dir));
    let stats_interval = std::time::Duration::from_secs(config.stats_interval_secs.max(1));
    let pipeline = Pipeline::new(config, writer);
    pipeline.start()?;

    let mut ticker = tokio::time::interval(stats_interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                pipeline.publish_metrics();
                let pool = pipeline.pool_status();
                let persistence = pipeline.persistence_stats();
                info!(
                    pool_queue = pool.queue_depth,
                    tasks_processed = pool.processed,
                    tasks_failed = pool.failed,
                    persist_queue = persistence.queue_depth,
                    items_succeeded = persistence.succeeded,
                    items_failed = persistence.failed,
                    items_retried = persistence.retried,
                    "Pipeline stats"
                );
            }
        }
    }

    pipeline.shutdown().await;
    Ok(())
}
