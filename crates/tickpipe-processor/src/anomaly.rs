//! Pluggable anomaly rules.
//!
//! The processor always runs its built-in previous-point percentage check.
//! Implementations of `AnomalyRule` (Z-score, IQR, pattern detectors, ...)
//! supplement that check: a tick is flagged when the built-in check or any
//! rule fires. Rules never see the very first observation of a symbol.

use crate::processor::PricePoint;
use tickpipe_core::PriceRecord;

/// A supplementary anomaly detector evaluated on every tick.
pub trait AnomalyRule: Send + Sync {
    /// Rule name, used in logs.
    fn name(&self) -> &str;

    /// Decide whether `candidate` is anomalous given the symbol's prior
    /// history (oldest first, never empty).
    fn evaluate(&self, history: &[PricePoint], candidate: &PriceRecord) -> bool;
}
