//! Core domain types for the tickpipe market data pipeline.
//!
//! This crate provides the types shared by every pipeline stage:
//! - `Price`: precision-safe decimal price
//! - `PriceRecord`, `SymbolInfo`: canonical market data records
//! - `TimeWindow`, `ChangeRate`: windowed analytics
//! - `PersistenceItem`, `PersistenceBatch`, `WriteReport`: persistence units

pub mod decimal;
pub mod error;
pub mod item;
pub mod record;
pub mod window;

pub use decimal::Price;
pub use error::{CoreError, Result};
pub use item::{ItemPayload, ItemType, PersistenceBatch, PersistenceItem, WriteError, WriteReport};
pub use record::{PriceRecord, SymbolInfo};
pub use window::{ChangeRate, TimeWindow};
