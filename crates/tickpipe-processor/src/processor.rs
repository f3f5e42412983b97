//! Per-symbol price history and change-rate computation.

use crate::anomaly::AnomalyRule;
use crate::config::ProcessorConfig;
use crate::error::ProcessorResult;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tickpipe_core::{ChangeRate, Price, PriceRecord, TimeWindow};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One stored history entry.
#[derive(Debug, Clone, Copy)]
pub struct PricePoint {
    pub price: Price,
    pub timestamp: DateTime<Utc>,
}

/// History and change-rate maps. One coarse lock guards both so cleanup
/// and processing never interleave inconsistently; shard by symbol hash if
/// symbol counts ever make this lock contended.
#[derive(Default)]
struct ProcessorState {
    history: HashMap<String, Vec<PricePoint>>,
    rates: HashMap<String, HashMap<TimeWindow, ChangeRate>>,
}

struct CleanupHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Stateful price processor.
///
/// Per symbol the lifecycle is implicit: no history, then warming, then
/// steady. The first observation of a symbol is never flagged anomalous.
pub struct PriceProcessor {
    config: ProcessorConfig,
    rules: Vec<Box<dyn AnomalyRule>>,
    state: RwLock<ProcessorState>,
    processed: AtomicU64,
    rejected: AtomicU64,
    anomalies: AtomicU64,
    cleanup: parking_lot::Mutex<Option<CleanupHandle>>,
}

impl PriceProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self::with_rules(config, Vec::new())
    }

    /// Create a processor with supplementary anomaly rules. The built-in
    /// previous-point check always runs; rules extend it, the stored flag
    /// is the OR of all verdicts.
    pub fn with_rules(config: ProcessorConfig, rules: Vec<Box<dyn AnomalyRule>>) -> Self {
        Self {
            config,
            rules,
            state: RwLock::new(ProcessorState::default()),
            processed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            anomalies: AtomicU64::new(0),
            cleanup: parking_lot::Mutex::new(None),
        }
    }

    /// Process one tick: validate, clean, flag anomalies, append to
    /// history, and recompute the change rate for every configured window.
    ///
    /// Returns the freshly computed rates, one per window.
    pub fn process_price(&self, record: &PriceRecord) -> ProcessorResult<Vec<ChangeRate>> {
        let now = Utc::now();

        if let Err(e) = record.validate(now, self.config.future_grace()) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(e.into());
        }

        let record = self.clean(record, now);
        let symbol = record.symbol.clone();
        let point = PricePoint {
            price: record.price,
            timestamp: record.timestamp,
        };

        let mut state = self.state.write();

        let anomalous = self.detect_anomaly(&state, &record);
        if anomalous {
            self.anomalies.fetch_add(1, Ordering::Relaxed);
            warn!(
                symbol = %symbol,
                price = %record.price,
                "Anomalous price move"
            );
        }

        state.history.entry(symbol.clone()).or_default().push(point);

        let rates = self.compute_rates(&state, &record);
        let slots = state.rates.entry(symbol.clone()).or_default();
        for rate in &rates {
            slots.insert(rate.window, rate.clone());
        }
        drop(state);

        self.processed.fetch_add(1, Ordering::Relaxed);
        debug!(symbol = %symbol, windows = rates.len(), "Processed tick");
        Ok(rates)
    }

    /// Process a batch sequentially. A failing record is logged and
    /// skipped, never aborting its siblings. Returns the processed count.
    pub fn process_batch(&self, records: &[PriceRecord]) -> usize {
        let mut ok = 0;
        for record in records {
            match self.process_price(record) {
                Ok(_) => ok += 1,
                Err(e) => {
                    warn!(symbol = %record.symbol, error = %e, "Skipping record in batch");
                }
            }
        }
        ok
    }

    fn clean(&self, record: &PriceRecord, now: DateTime<Utc>) -> PriceRecord {
        let mut out = record.clone();
        out.symbol = record.symbol.trim().to_uppercase();
        if out.timestamp > now {
            out.timestamp = now;
        }
        if !out.price.is_positive() {
            out.price = Price::new(self.config.price_epsilon);
        }
        out
    }

    /// Built-in previous-point check plus supplementary rules. Nothing
    /// fires on the first observation of a symbol.
    fn detect_anomaly(&self, state: &ProcessorState, record: &PriceRecord) -> bool {
        let history = match state.history.get(&record.symbol) {
            Some(h) if !h.is_empty() => h,
            _ => return false,
        };

        let prev = history[history.len() - 1];
        let baseline = record
            .price
            .pct_from(prev.price)
            .map(|delta| delta.abs() > self.config.anomaly_threshold_pct)
            .unwrap_or(false);
        if baseline {
            return true;
        }

        self.rules.iter().any(|rule| {
            let hit = rule.evaluate(history, record);
            if hit {
                debug!(rule = rule.name(), symbol = %record.symbol, "Anomaly rule fired");
            }
            hit
        })
    }

    /// One rate per window. The window start is the earliest history entry
    /// within the trailing window; with no such entry the current price
    /// stands in, yielding a 0% rate.
    fn compute_rates(&self, state: &ProcessorState, record: &PriceRecord) -> Vec<ChangeRate> {
        let history = match state.history.get(&record.symbol) {
            Some(h) => h.as_slice(),
            None => &[],
        };

        self.config
            .windows
            .iter()
            .map(|window| {
                let cutoff = record.timestamp - window.duration();
                let start = history
                    .iter()
                    .find(|p| p.timestamp >= cutoff)
                    .map(|p| p.price)
                    .unwrap_or(record.price);
                ChangeRate::compute(
                    record.symbol.clone(),
                    *window,
                    start,
                    record.price,
                    record.timestamp,
                    self.config.max_price_change_pct,
                    self.config.anomaly_threshold_pct,
                )
            })
            .collect()
    }

    /// Prune history entries older than the retention window.
    pub fn prune_history(&self) {
        let cutoff = Utc::now() - self.config.history_retention();
        let mut state = self.state.write();
        let before: usize = state.history.values().map(Vec::len).sum();
        for entries in state.history.values_mut() {
            entries.retain(|p| p.timestamp >= cutoff);
        }
        state.history.retain(|_, entries| !entries.is_empty());
        let after: usize = state.history.values().map(Vec::len).sum();
        if before != after {
            info!(pruned = before - after, "Pruned price history");
        }
    }

    /// Spawn the periodic cleanup task. Owned by this processor: it is
    /// cancelled and joined by `shutdown`.
    pub fn start_cleanup(self: &Arc<Self>) {
        let mut slot = self.cleanup.lock();
        if slot.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let processor = Arc::clone(self);
        let interval = self.config.cleanup_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => processor.prune_history(),
                }
            }
        });
        *slot = Some(CleanupHandle { cancel, handle });
    }

    /// Cancel and join the cleanup task.
    pub async fn shutdown(&self) {
        let handle = self.cleanup.lock().take();
        if let Some(CleanupHandle { cancel, handle }) = handle {
            cancel.cancel();
            let _ = handle.await;
        }
    }

    /// Current change rates for one symbol.
    pub fn change_rates(&self, symbol: &str) -> Option<HashMap<TimeWindow, ChangeRate>> {
        self.state.read().rates.get(symbol).cloned()
    }

    /// Current change rates for every tracked symbol.
    pub fn all_change_rates(&self) -> HashMap<String, HashMap<TimeWindow, ChangeRate>> {
        self.state.read().rates.clone()
    }

    pub fn history_len(&self, symbol: &str) -> usize {
        self.state
            .read()
            .history
            .get(symbol)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn tracked_symbols(&self) -> Vec<String> {
        self.state.read().history.keys().cloned().collect()
    }

    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn anomaly_count(&self) -> u64 {
        self.anomalies.load(Ordering::Relaxed)
    }
}
