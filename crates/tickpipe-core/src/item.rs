//! Persistence units: items, batches, and per-batch write outcomes.
//!
//! The payload is a closed sum type keyed by the item's type tag, so the
//! merger and writer adapters match exhaustively instead of downcasting.
//! An item is owned exclusively by the persistence engine from submission
//! until its terminal outcome.

use crate::record::{PriceRecord, SymbolInfo};
use crate::window::ChangeRate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Logical type tag of a persistence item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Price,
    ChangeRate,
    SymbolInfo,
    /// Forward-compatible escape hatch; items of this type are never merged.
    Other(String),
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Price => write!(f, "price"),
            Self::ChangeRate => write!(f, "change_rate"),
            Self::SymbolInfo => write!(f, "symbol_info"),
            Self::Other(tag) => write!(f, "{tag}"),
        }
    }
}

/// Typed payload of a persistence item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ItemPayload {
    Price(PriceRecord),
    ChangeRate(ChangeRate),
    SymbolInfo(SymbolInfo),
    /// Opaque payload for unknown item types; passed through untouched.
    Raw(serde_json::Value),
}

impl ItemPayload {
    /// The type tag this payload naturally carries.
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Price(_) => ItemType::Price,
            Self::ChangeRate(_) => ItemType::ChangeRate,
            Self::SymbolInfo(_) => ItemType::SymbolInfo,
            Self::Raw(_) => ItemType::Other("raw".to_string()),
        }
    }

    /// Natural merge key: symbol for price/symbol-info, symbol+window for
    /// change rates. Raw payloads have no natural key.
    pub fn natural_key(&self) -> Option<String> {
        match self {
            Self::Price(r) => Some(r.symbol.clone()),
            Self::ChangeRate(c) => Some(format!("{}:{}", c.symbol, c.window.label())),
            Self::SymbolInfo(s) => Some(s.symbol.clone()),
            Self::Raw(_) => None,
        }
    }

    /// Event timestamp embedded in the payload, when it has one.
    pub fn event_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Price(r) => Some(r.timestamp),
            Self::ChangeRate(c) => Some(c.timestamp),
            Self::SymbolInfo(s) => Some(s.updated_at),
            Self::Raw(_) => None,
        }
    }
}

/// One unit of pending persistence work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceItem {
    /// Unique item id.
    pub id: String,
    /// Logical type tag. Normally derived from the payload; a mismatch
    /// marks the item as unmergeable and it passes through untouched.
    pub item_type: ItemType,
    /// Typed payload.
    pub payload: ItemPayload,
    /// Event timestamp used for ordering within a merge group.
    pub timestamp: DateTime<Utc>,
    /// Lower is more urgent.
    pub priority: u8,
    /// Number of retries already attempted for this item.
    pub retry_count: u32,
    /// When the item was created.
    pub created_at: DateTime<Utc>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PersistenceItem {
    pub const DEFAULT_PRIORITY: u8 = 5;

    /// Wrap a payload into a new item with a fresh id.
    ///
    /// The item timestamp is taken from the payload's event time when the
    /// payload carries one, otherwise from the wall clock.
    pub fn new(payload: ItemPayload) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            item_type: payload.item_type(),
            timestamp: payload.event_timestamp().unwrap_or(now),
            payload,
            priority: Self::DEFAULT_PRIORITY,
            retry_count: 0,
            created_at: now,
            metadata: HashMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the type tag matches the payload variant.
    pub fn tag_matches_payload(&self) -> bool {
        self.item_type == self.payload.item_type()
    }

    /// Rough heap footprint estimate, used for the engine's memory gauge.
    pub fn approx_size(&self) -> usize {
        let meta: usize = self
            .metadata
            .iter()
            .map(|(k, v)| k.len() + v.len() + 32)
            .sum();
        let payload = match &self.payload {
            ItemPayload::Price(r) => r.symbol.len() + r.source.len() + 96,
            ItemPayload::ChangeRate(c) => c.symbol.len() + 128,
            ItemPayload::SymbolInfo(s) => {
                s.symbol.len() + s.base_asset.len() + s.quote_asset.len() + s.status.len() + 64
            }
            ItemPayload::Raw(v) => v.to_string().len(),
        };
        self.id.len() + payload + meta + 64
    }
}

/// An ordered collection of items assembled for one write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceBatch {
    pub items: Vec<PersistenceItem>,
    /// When the batch was assembled.
    pub created_at: DateTime<Utc>,
    /// Most urgent priority among the items.
    pub priority: u8,
}

impl PersistenceBatch {
    pub fn new(items: Vec<PersistenceItem>) -> Self {
        let priority = items
            .iter()
            .map(|i| i.priority)
            .min()
            .unwrap_or(PersistenceItem::DEFAULT_PRIORITY);
        Self {
            items,
            created_at: Utc::now(),
            priority,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Per-item failure attribution from one batch write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteError {
    /// Id of the failed item.
    pub item_id: String,
    /// Sink-reported error message.
    pub message: String,
    /// When the failure was observed.
    pub timestamp: DateTime<Utc>,
    /// Sink's verdict on whether a retry could succeed.
    pub retryable: bool,
}

impl WriteError {
    pub fn new(item_id: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            item_id: item_id.into(),
            message: message.into(),
            timestamp: Utc::now(),
            retryable,
        }
    }
}

/// Outcome of one batch write: which items landed, which failed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteReport {
    /// Ids of items written successfully.
    pub succeeded: Vec<String>,
    /// Per-item failures.
    pub errors: Vec<WriteError>,
}

impl WriteReport {
    pub fn all_ok(batch: &PersistenceBatch) -> Self {
        Self {
            succeeded: batch.items.iter().map(|i| i.id.clone()).collect(),
            errors: Vec::new(),
        }
    }

    pub fn is_complete_success(&self) -> bool {
        self.errors.is_empty()
    }
}
