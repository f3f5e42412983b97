//! Pipeline assembly: parser → processor → persistence, with the worker
//! pool running ingestion units under bounded concurrency.

use crate::config::AppConfig;
use crate::error::AppResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tickpipe_core::{ItemPayload, PersistenceItem, SymbolInfo};
use tickpipe_feed::MessageParser;
use tickpipe_persistence::{PersistenceEngine, PersistenceStats, Writer};
use tickpipe_pool::{PoolStatus, Task, WorkerPool};
use tickpipe_processor::PriceProcessor;
use tickpipe_telemetry::Metrics;
use tracing::{debug, info, warn};

/// The stages shared between inline calls and pool tasks.
struct PipelineCore {
    parser: MessageParser,
    processor: Arc<PriceProcessor>,
    engine: Arc<PersistenceEngine>,
}

impl PipelineCore {
    /// Parse one payload (object or array), run every record through the
    /// processor, and hand records plus fresh change rates to the engine.
    ///
    /// Returns the number of records fully processed. A full persistence
    /// queue propagates as an error so callers (and pool retries) see
    /// backpressure.
    fn process_payload(&self, raw: &[u8]) -> AppResult<usize> {
        let outcome = match self.parser.parse_batch(raw) {
            Ok(outcome) => outcome,
            Err(e) => {
                Metrics::parse_rejected("payload");
                return Err(e.into());
            }
        };
        for _ in &outcome.warnings {
            Metrics::parse_rejected("item");
        }

        let mut processed = 0;
        for record in &outcome.records {
            let rates = match self.processor.process_price(record) {
                Ok(rates) => rates,
                Err(e) => {
                    warn!(symbol = %record.symbol, error = %e, "Record rejected by processor");
                    continue;
                }
            };
            Metrics::tick_parsed(&record.source);
            if rates.iter().any(|r| r.anomalous) {
                Metrics::anomaly(&record.symbol);
            }

            self.engine
                .submit(PersistenceItem::new(ItemPayload::Price(record.clone())))?;
            for rate in rates {
                self.engine
                    .submit(PersistenceItem::new(ItemPayload::ChangeRate(rate)))?;
            }
            processed += 1;
        }

        debug!(
            records = outcome.records.len(),
            processed, "Payload processed"
        );
        Ok(processed)
    }
}

/// The assembled ingestion pipeline.
pub struct Pipeline {
    core: Arc<PipelineCore>,
    pool: Arc<WorkerPool>,
    task_seq: AtomicU64,
}

impl Pipeline {
    pub fn new(config: AppConfig, writer: Arc<dyn Writer>) -> Self {
        let core = PipelineCore {
            parser: MessageParser::new(config.parser),
            processor: Arc::new(PriceProcessor::new(config.processor)),
            engine: Arc::new(PersistenceEngine::new(config.persistence, writer)),
        };
        Self {
            core: Arc::new(core),
            pool: Arc::new(WorkerPool::new(config.pool)),
            task_seq: AtomicU64::new(0),
        }
    }

    /// Start the pool, the engine, and the processor's cleanup task.
    pub fn start(&self) -> AppResult<()> {
        self.pool.start()?;
        self.core.engine.start()?;
        self.core.processor.start_cleanup();
        info!("Pipeline started");
        Ok(())
    }

    /// Process one raw payload inline on the caller's task.
    pub fn process_payload(&self, raw: &[u8]) -> AppResult<usize> {
        self.core.process_payload(raw)
    }

    /// Submit one raw payload as a retryable pool task. Fails fast when
    /// the pool queue is full.
    pub fn ingest(&self, raw: Vec<u8>) -> AppResult<()> {
        let seq = self.task_seq.fetch_add(1, Ordering::Relaxed);
        let core = self.core.clone();
        let task = Task::new(format!("ingest-{seq}"), move || {
            let core = core.clone();
            let raw = raw.clone();
            Box::pin(async move {
                core.process_payload(&raw)
                    .map(|_| ())
                    .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })
            })
        });
        self.pool.submit(task)?;
        Ok(())
    }

    /// Queue symbol reference metadata for persistence.
    pub fn submit_symbol_info(&self, info: SymbolInfo) -> AppResult<()> {
        self.core
            .engine
            .submit(PersistenceItem::new(ItemPayload::SymbolInfo(info)))?;
        Ok(())
    }

    /// Stop ingestion first, then flush what is left downstream.
    pub async fn shutdown(&self) {
        self.pool.stop().await;
        self.core.processor.shutdown().await;
        self.core.engine.shutdown().await;
        info!("Pipeline stopped");
    }

    pub async fn health_check(&self) -> AppResult<()> {
        self.core.engine.health_check().await?;
        Ok(())
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    pub fn persistence_stats(&self) -> PersistenceStats {
        self.core.engine.stats()
    }

    pub fn processor(&self) -> &Arc<PriceProcessor> {
        &self.core.processor
    }

    /// Push current queue depths and outcome counters to the metrics
    /// registry.
    pub fn publish_metrics(&self) {
        let pool = self.pool_status();
        Metrics::queue_depth("pool", pool.queue_depth as i64);
        let stats = self.persistence_stats();
        Metrics::queue_depth("persistence", stats.queue_depth as i64);
    }
}
