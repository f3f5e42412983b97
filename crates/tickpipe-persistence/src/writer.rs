//! Writer contract and the JSON Lines reference implementation.
//!
//! The engine only ever talks to the `Writer` trait; storage backends
//! live behind it. The bundled `JsonLinesWriter` appends items as JSON
//! Lines with daily file rotation:
//! - each line is a complete JSON object
//! - partial corruption only affects individual lines
//! - files stay readable even if a write was interrupted

use crate::error::{PersistenceError, PersistenceResult};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write as IoWrite};
use tickpipe_core::{PersistenceBatch, PersistenceItem, WriteError, WriteReport};
use tracing::{debug, info, warn};

/// Batch-write contract implemented by storage backends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Writer: Send + Sync {
    /// Write a single item.
    async fn write(&self, item: &PersistenceItem) -> PersistenceResult<()>;

    /// Write a batch, reporting per-item success/failure. A transport-level
    /// `Err` means no per-item verdict exists; the engine classifies it.
    async fn write_batch(&self, batch: &PersistenceBatch) -> PersistenceResult<WriteReport>;

    /// Probe sink health.
    async fn health_check(&self) -> PersistenceResult<()>;

    /// Flush and release resources.
    async fn close(&self) -> PersistenceResult<()>;
}

/// Open file for the current date.
struct ActiveFile {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

/// JSON Lines writer with daily rotation, append mode.
pub struct JsonLinesWriter {
    base_dir: String,
    active: Mutex<Option<ActiveFile>>,
}

impl JsonLinesWriter {
    pub fn new(base_dir: &str) -> Self {
        if let Err(e) = std::fs::create_dir_all(base_dir) {
            warn!(?e, "Failed to create directory: {}", base_dir);
        }
        Self {
            base_dir: base_dir.to_string(),
            active: Mutex::new(None),
        }
    }

    fn open_for(&self, date: &str) -> PersistenceResult<ActiveFile> {
        let filename = format!("{}/items_{}.jsonl", self.base_dir, date);
        info!(filename = %filename, "Opening JSON Lines file (append mode)");

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&filename)?;

        Ok(ActiveFile {
            writer: BufWriter::new(file),
            date: date.to_string(),
            records_written: 0,
        })
    }

    /// Write pre-serialized lines under the lock, rotating on date change.
    fn write_lines(&self, lines: &[String]) -> PersistenceResult<()> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let mut guard = self.active.lock();

        let needs_rotation = guard.as_ref().map(|a| a.date != today).unwrap_or(false);
        if needs_rotation {
            if let Some(mut old) = guard.take() {
                if let Err(e) = old.writer.flush() {
                    warn!(?e, "Failed to flush file on rotation");
                }
                info!(date = %old.date, records = old.records_written, "Rotated JSON Lines file");
            }
        }

        if guard.is_none() {
            *guard = Some(self.open_for(&today)?);
        }
        let active = guard.as_mut().expect("active file was just opened");

        for line in lines {
            writeln!(active.writer, "{line}")?;
        }
        active.writer.flush()?;
        active.records_written += lines.len();

        debug!(records = lines.len(), "Flushed items to JSON Lines");
        Ok(())
    }
}

#[async_trait]
impl Writer for JsonLinesWriter {
    async fn write(&self, item: &PersistenceItem) -> PersistenceResult<()> {
        let line = serde_json::to_string(item)?;
        self.write_lines(&[line])
    }

    async fn write_batch(&self, batch: &PersistenceBatch) -> PersistenceResult<WriteReport> {
        let mut report = WriteReport::default();
        let mut lines = Vec::with_capacity(batch.len());
        let mut serialized_ids = Vec::with_capacity(batch.len());

        for item in &batch.items {
            match serde_json::to_string(item) {
                Ok(line) => {
                    lines.push(line);
                    serialized_ids.push(item.id.clone());
                }
                Err(e) => {
                    report.errors.push(WriteError::new(
                        item.id.clone(),
                        format!("serialization failed: {e}"),
                        false,
                    ));
                }
            }
        }

        self.write_lines(&lines)?;
        report.succeeded = serialized_ids;
        Ok(report)
    }

    async fn health_check(&self) -> PersistenceResult<()> {
        let meta = std::fs::metadata(&self.base_dir)?;
        if !meta.is_dir() {
            return Err(PersistenceError::Writer(format!(
                "{} is not a directory",
                self.base_dir
            )));
        }
        Ok(())
    }

    async fn close(&self) -> PersistenceResult<()> {
        if let Some(mut active) = self.active.lock().take() {
            active.writer.flush()?;
            info!(
                date = %active.date,
                records = active.records_written,
                "Closed JSON Lines writer"
            );
        }
        Ok(())
    }
}

impl Drop for JsonLinesWriter {
    fn drop(&mut self) {
        if let Some(mut active) = self.active.lock().take() {
            if let Err(e) = active.writer.flush() {
                warn!(?e, "Failed to flush file on drop");
            }
        }
    }
}
