//! Stateful price processing for tickpipe.
//!
//! Maintains per-symbol price history, computes change rates over the
//! configured trailing windows on every tick, and flags anomalous moves
//! inline. History is pruned by an owned periodic cleanup task.

pub mod anomaly;
pub mod config;
pub mod error;
pub mod processor;

pub use anomaly::AnomalyRule;
pub use config::ProcessorConfig;
pub use error::{ProcessorError, ProcessorResult};
pub use processor::{PricePoint, PriceProcessor};
