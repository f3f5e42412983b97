//! End-to-end pipeline tests: raw payloads in, persisted items out.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tickpipe_app::{AppConfig, Pipeline};
use tickpipe_core::{
    ItemPayload, PersistenceBatch, PersistenceItem, SymbolInfo, TimeWindow, WriteError,
    WriteReport,
};
use tickpipe_persistence::{PersistenceResult, Writer};

/// Collects everything it is asked to write.
struct VecWriter {
    items: Mutex<Vec<PersistenceItem>>,
}

impl VecWriter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(Vec::new()),
        })
    }

    fn written(&self) -> Vec<PersistenceItem> {
        self.items.lock().clone()
    }
}

#[async_trait]
impl Writer for VecWriter {
    async fn write(&self, item: &PersistenceItem) -> PersistenceResult<()> {
        self.items.lock().push(item.clone());
        Ok(())
    }

    async fn write_batch(&self, batch: &PersistenceBatch) -> PersistenceResult<WriteReport> {
        self.items.lock().extend(batch.items.iter().cloned());
        Ok(WriteReport::all_ok(batch))
    }

    async fn health_check(&self) -> PersistenceResult<()> {
        Ok(())
    }

    async fn close(&self) -> PersistenceResult<()> {
        Ok(())
    }
}

/// Fails every item with a transient-flavored error.
struct DownWriter;

#[async_trait]
impl Writer for DownWriter {
    async fn write(&self, _item: &PersistenceItem) -> PersistenceResult<()> {
        Err(tickpipe_persistence::PersistenceError::Writer(
            "network down".to_string(),
        ))
    }

    async fn write_batch(&self, batch: &PersistenceBatch) -> PersistenceResult<WriteReport> {
        Ok(WriteReport {
            succeeded: Vec::new(),
            errors: batch
                .items
                .iter()
                .map(|i| WriteError::new(i.id.clone(), "network down", true))
                .collect(),
        })
    }

    async fn health_check(&self) -> PersistenceResult<()> {
        Ok(())
    }

    async fn close(&self) -> PersistenceResult<()> {
        Ok(())
    }
}

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.persistence.batch_timeout_ms = 50;
    config.persistence.dedup_enabled = false;
    config.persistence.retry_interval_ms = 10;
    config.persistence.shutdown_grace_ms = 1000;
    config.pool.retry_delay_ms = 10;
    config.pool.shutdown_grace_ms = 1000;
    config
}

async fn wait_until(deadline_ms: u64, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(deadline_ms);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

fn tick_payload(symbol: &str, price: &str, epoch_secs: i64) -> Vec<u8> {
    serde_json::json!({
        "symbol": symbol,
        "price": price,
        "timestamp": epoch_secs,
        "source": "binance",
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn test_ticks_flow_to_writer_with_change_rates() {
    let writer = VecWriter::new();
    let pipeline = Pipeline::new(fast_config(), writer.clone());
    pipeline.start().unwrap();

    // Three BTCUSDT ticks inside the last couple of minutes: 100 at t,
    // 101 thirty seconds later, 103 at t+61s.
    let base = Utc::now().timestamp() - 70;
    pipeline
        .process_payload(&tick_payload("BTCUSDT", "100", base))
        .unwrap();
    pipeline
        .process_payload(&tick_payload("BTCUSDT", "101", base + 30))
        .unwrap();
    pipeline
        .process_payload(&tick_payload("BTCUSDT", "103", base + 61))
        .unwrap();

    // The 1m window start is the t+30s entry, so the final rate is
    // (103-101)/101*100 ~= 1.98%, neither invalid nor anomalous.
    let rates = pipeline.processor().change_rates("BTCUSDT").unwrap();
    let m1 = &rates[&TimeWindow::M1];
    assert!(m1.rate_pct > dec!(1.97) && m1.rate_pct < dec!(1.99));
    assert!(m1.valid);
    assert!(!m1.anomalous);

    // Price records and change rates both reach the sink.
    assert!(
        wait_until(3000, || {
            let written = writer.written();
            let has_price = written
                .iter()
                .any(|i| matches!(&i.payload, ItemPayload::Price(r) if r.symbol == "BTCUSDT"));
            let has_rate = written
                .iter()
                .any(|i| matches!(&i.payload, ItemPayload::ChangeRate(c) if c.symbol == "BTCUSDT"));
            has_price && has_rate
        })
        .await
    );

    let stats = pipeline.persistence_stats();
    assert!(stats.succeeded > 0);
    assert_eq!(stats.failed, 0);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_pooled_ingestion_processes_payloads() {
    let writer = VecWriter::new();
    let pipeline = Pipeline::new(fast_config(), writer.clone());
    pipeline.start().unwrap();

    let now = Utc::now().timestamp();
    for (i, symbol) in ["BTCUSDT", "ETHUSDT", "SOLUSDT"].iter().enumerate() {
        pipeline
            .ingest(tick_payload(symbol, "100", now - 10 + i as i64))
            .unwrap();
    }

    assert!(wait_until(3000, || pipeline.pool_status().processed == 3).await);
    assert!(wait_until(3000, || pipeline.persistence_stats().succeeded >= 3).await);
    assert_eq!(pipeline.processor().tracked_symbols().len(), 3);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_batch_payload_with_invalid_item_continues() {
    let writer = VecWriter::new();
    let pipeline = Pipeline::new(fast_config(), writer.clone());
    pipeline.start().unwrap();

    let now = Utc::now().timestamp();
    let batch = serde_json::json!([
        { "symbol": "BTCUSDT", "price": 100, "timestamp": now - 5 },
        { "price": 100, "timestamp": now - 5 },
        { "symbol": "ETHUSDT", "price": 2000, "timestamp": now - 5 },
    ])
    .to_string()
    .into_bytes();

    let processed = pipeline.process_payload(&batch).unwrap();
    assert_eq!(processed, 2);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_symbol_info_round_trip() {
    let writer = VecWriter::new();
    let pipeline = Pipeline::new(fast_config(), writer.clone());
    pipeline.start().unwrap();

    pipeline
        .submit_symbol_info(SymbolInfo::new("BTCUSDT", "BTC", "USDT"))
        .unwrap();

    assert!(
        wait_until(3000, || {
            writer
                .written()
                .iter()
                .any(|i| matches!(&i.payload, ItemPayload::SymbolInfo(s) if s.symbol == "BTCUSDT"))
        })
        .await
    );
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_unavailable_sink_retries_then_records_permanent_failure() {
    let mut config = fast_config();
    // One record, no windows: exactly one persistence item.
    config.processor.windows = Vec::new();
    config.persistence.max_retries = 2;
    config.persistence.batch_size = 1;
    config.persistence.batch_timeout_ms = 20;

    let pipeline = Pipeline::new(config, Arc::new(DownWriter));
    pipeline.start().unwrap();

    let now = Utc::now().timestamp();
    pipeline
        .process_payload(&tick_payload("BTCUSDT", "100", now - 5))
        .unwrap();

    // Exactly max_retries retries, then a permanent failure; never an
    // endless retry loop.
    assert!(wait_until(5000, || pipeline.persistence_stats().failed == 1).await);
    let stats = pipeline.persistence_stats();
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.succeeded, 0);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_health_check_delegates_to_writer() {
    let pipeline = Pipeline::new(fast_config(), VecWriter::new());
    pipeline.start().unwrap();
    assert!(pipeline.health_check().await.is_ok());
    pipeline.shutdown().await;
}
