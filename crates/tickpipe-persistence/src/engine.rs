//! Asynchronous persistence engine.
//!
//! Producers enqueue items with fail-fast admission; one batcher task
//! drains the queue into batches bounded by size or a flush timer,
//! deduplicates, integrity-checks, merges, and writes. Transient failures
//! are re-submitted through the same queue after a backoff delay.

use crate::config::PersistenceConfig;
use crate::dedup::Deduplicator;
use crate::error::{PersistenceError, PersistenceResult};
use crate::merger::Merger;
use crate::retry::RetryManager;
use crate::stats::{EngineStats, PersistenceStats};
use crate::writer::Writer;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tickpipe_core::{ItemPayload, PersistenceBatch, PersistenceItem, WriteError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything the batcher task needs.
struct BatcherCtx {
    config: PersistenceConfig,
    writer: Arc<dyn Writer>,
    retry: RetryManager,
    stats: Arc<EngineStats>,
    queue_depth: Arc<AtomicUsize>,
    tx: mpsc::Sender<PersistenceItem>,
    cancel: CancellationToken,
}

/// Asynchronous batching persistence engine.
pub struct PersistenceEngine {
    config: PersistenceConfig,
    writer: Arc<dyn Writer>,
    retry: RetryManager,
    stats: Arc<EngineStats>,
    queue_depth: Arc<AtomicUsize>,
    running: AtomicBool,
    tx: parking_lot::Mutex<Option<mpsc::Sender<PersistenceItem>>>,
    cancel: parking_lot::Mutex<Option<CancellationToken>>,
    batcher: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceEngine {
    pub fn new(config: PersistenceConfig, writer: Arc<dyn Writer>) -> Self {
        let retry = RetryManager::new(&config);
        Self {
            config,
            writer,
            retry,
            stats: Arc::new(EngineStats::default()),
            queue_depth: Arc::new(AtomicUsize::new(0)),
            running: AtomicBool::new(false),
            tx: parking_lot::Mutex::new(None),
            cancel: parking_lot::Mutex::new(None),
            batcher: parking_lot::Mutex::new(None),
        }
    }

    /// Spawn the batcher task. Fails if already running.
    pub fn start(&self) -> PersistenceResult<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PersistenceError::AlreadyRunning);
        }

        let (tx, rx) = mpsc::channel(self.config.queue_size);
        let cancel = CancellationToken::new();
        let ctx = BatcherCtx {
            config: self.config.clone(),
            writer: self.writer.clone(),
            retry: self.retry.clone(),
            stats: self.stats.clone(),
            queue_depth: self.queue_depth.clone(),
            tx: tx.clone(),
            cancel: cancel.clone(),
        };

        *self.batcher.lock() = Some(tokio::spawn(batcher_loop(rx, ctx)));
        *self.tx.lock() = Some(tx);
        *self.cancel.lock() = Some(cancel);

        info!(
            queue_size = self.config.queue_size,
            batch_size = self.config.batch_size,
            batch_timeout_ms = self.config.batch_timeout_ms,
            "Persistence engine started"
        );
        Ok(())
    }

    /// Non-blocking enqueue. Accepted means the engine now owns the item;
    /// its fate is observable only via stats. A full queue is an immediate
    /// rejection and the caller's backpressure signal.
    pub fn submit(&self, item: PersistenceItem) -> PersistenceResult<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(PersistenceError::NotRunning);
        }
        let tx = self
            .tx
            .lock()
            .as_ref()
            .cloned()
            .ok_or(PersistenceError::NotRunning)?;

        match tx.try_send(item) {
            Ok(()) => {
                self.stats.record_submitted(1);
                self.queue_depth.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(PersistenceError::QueueFull(self.config.queue_size))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PersistenceError::NotRunning),
        }
    }

    /// Enqueue a batch. Stops at the first rejection; items accepted
    /// before it stay owned by the engine.
    pub fn submit_batch(&self, items: Vec<PersistenceItem>) -> PersistenceResult<()> {
        for item in items {
            self.submit(item)?;
        }
        Ok(())
    }

    /// Flush pending work best-effort within the shutdown grace, then stop.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
        self.tx.lock().take();

        let handle = self.batcher.lock().take();
        if let Some(handle) = handle {
            let grace = self.config.shutdown_grace();
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!(
                    grace_ms = self.config.shutdown_grace_ms,
                    "Persistence shutdown grace elapsed before final flush completed"
                );
            }
        }

        if let Err(e) = self.writer.close().await {
            warn!(error = %e, "Writer close failed");
        }
        info!("Persistence engine stopped");
    }

    /// Engine health is the writer's health.
    pub async fn health_check(&self) -> PersistenceResult<()> {
        self.writer.health_check().await
    }

    /// Point-in-time stats snapshot.
    pub fn stats(&self) -> PersistenceStats {
        self.stats.snapshot(
            self.queue_depth.load(Ordering::Relaxed),
            self.config.queue_size,
            self.config.memory_limit_bytes,
        )
    }

    /// Zero all counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

async fn batcher_loop(mut rx: mpsc::Receiver<PersistenceItem>, ctx: BatcherCtx) {
    let mut pending: Vec<PersistenceItem> = Vec::with_capacity(ctx.config.batch_size);
    let mut dedup = ctx
        .config
        .dedup_enabled
        .then(|| Deduplicator::new(ctx.config.dedup_window_ms));
    let mut ticker = tokio::time::interval(ctx.config.batch_timeout());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                // Drain whatever is already queued, one final flush, done.
                while let Ok(item) = rx.try_recv() {
                    ctx.queue_depth.fetch_sub(1, Ordering::Relaxed);
                    accept(item, &mut pending, &mut dedup, &ctx);
                }
                flush(&mut pending, &ctx).await;
                break;
            }
            _ = ticker.tick() => {
                if !pending.is_empty() {
                    flush(&mut pending, &ctx).await;
                }
            }
            item = rx.recv() => match item {
                Some(item) => {
                    ctx.queue_depth.fetch_sub(1, Ordering::Relaxed);
                    accept(item, &mut pending, &mut dedup, &ctx);
                    if pending.len() >= ctx.config.batch_size {
                        flush(&mut pending, &ctx).await;
                    }
                }
                None => {
                    flush(&mut pending, &ctx).await;
                    break;
                }
            }
        }
    }
    debug!("Batcher loop exited");
}

fn accept(
    item: PersistenceItem,
    pending: &mut Vec<PersistenceItem>,
    dedup: &mut Option<Deduplicator>,
    ctx: &BatcherCtx,
) {
    // Retries re-enter through the same queue with an unchanged payload;
    // they are deliberate re-submissions, not duplicates.
    if item.retry_count == 0 {
        if let Some(dedup) = dedup {
            if dedup.check_and_record(&item, Utc::now()) {
                ctx.stats.record_deduplicated(1);
                debug!(item_id = %item.id, "Dropped duplicate item");
                return;
            }
        }
    }
    ctx.stats.add_buffered(item.approx_size() as u64);
    pending.push(item);
}

async fn flush(pending: &mut Vec<PersistenceItem>, ctx: &BatcherCtx) {
    if pending.is_empty() {
        return;
    }
    let started = Instant::now();
    let drained = std::mem::take(pending);
    let buffered: u64 = drained.iter().map(|i| i.approx_size() as u64).sum();
    ctx.stats.sub_buffered(buffered);

    let mut items = drained;
    if ctx.config.integrity_check {
        let (ok, invalid): (Vec<_>, Vec<_>) =
            items.into_iter().partition(|i| integrity_ok(i).is_ok());
        for item in invalid {
            let reason = integrity_ok(&item).unwrap_err();
            warn!(item_id = %item.id, %reason, "Integrity check excluded item");
            ctx.stats.record_permanent_failure(1);
        }
        items = ok;
    }

    let outcome = Merger::merge(items);
    ctx.stats.record_merged(outcome.collapsed);
    if outcome.items.is_empty() {
        return;
    }

    let batch = PersistenceBatch::new(outcome.items);
    let batch_size = batch.len();

    match ctx.writer.write_batch(&batch).await {
        Ok(report) => {
            let mut error_by_id: HashMap<String, WriteError> = report
                .errors
                .into_iter()
                .map(|e| (e.item_id.clone(), e))
                .collect();
            for item in batch.items {
                match error_by_id.remove(&item.id) {
                    Some(error) => {
                        dispose_failure(ctx, item, &error.message, Some(error.retryable));
                    }
                    None => ctx.stats.record_success(1),
                }
            }
        }
        Err(e) => {
            // No per-item verdict from the sink: classify the call error
            // for every item in the batch.
            let message = e.to_string();
            warn!(batch_size, error = %message, "Batch write failed");
            for item in batch.items {
                dispose_failure(ctx, item, &message, None);
            }
        }
    }

    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    ctx.stats.record_batch(batch_size, latency_ms);
}

/// Structural validation applied before a write.
fn integrity_ok(item: &PersistenceItem) -> Result<(), String> {
    if item.id.trim().is_empty() {
        return Err("empty item id".to_string());
    }
    match &item.payload {
        ItemPayload::Price(r) => {
            if r.symbol.trim().is_empty() {
                return Err("price record without symbol".to_string());
            }
            if !r.price.is_positive() {
                return Err(format!("non-positive price {}", r.price));
            }
        }
        ItemPayload::ChangeRate(c) => {
            if c.symbol.trim().is_empty() {
                return Err("change rate without symbol".to_string());
            }
        }
        ItemPayload::SymbolInfo(s) => {
            if s.symbol.trim().is_empty() {
                return Err("symbol info without symbol".to_string());
            }
        }
        ItemPayload::Raw(_) => {}
    }
    Ok(())
}

/// Route one failed item: re-submit after backoff when eligible, record a
/// permanent failure otherwise.
///
/// Eligible means the retry count is still below the ceiling AND the
/// failure is transient, either by the sink's per-item flag or by message
/// classification when the sink gave no verdict.
fn dispose_failure(
    ctx: &BatcherCtx,
    mut item: PersistenceItem,
    message: &str,
    sink_retryable: Option<bool>,
) {
    let transient = sink_retryable.unwrap_or_else(|| RetryManager::is_transient(message));

    if !transient || item.retry_count >= ctx.retry.max_retries() {
        ctx.stats.record_permanent_failure(1);
        warn!(
            item_id = %item.id,
            retry_count = item.retry_count,
            %message,
            "Item failed permanently"
        );
        return;
    }

    let delay = ctx.retry.retry_delay(item.retry_count);
    item.retry_count += 1;
    ctx.stats.record_retry(1);
    debug!(
        item_id = %item.id,
        retry_count = item.retry_count,
        delay_ms = delay.as_millis() as u64,
        "Scheduling item retry"
    );

    let tx = ctx.tx.clone();
    let cancel = ctx.cancel.clone();
    let stats = ctx.stats.clone();
    let queue_depth = ctx.queue_depth.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                stats.record_permanent_failure(1);
            }
            _ = tokio::time::sleep(delay) => {
                let item_id = item.id.clone();
                match tx.try_send(item) {
                    Ok(()) => {
                        queue_depth.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_) => {
                        stats.record_permanent_failure(1);
                        warn!(%item_id, "Retry dropped: queue full");
                    }
                }
            }
        }
    });
}
