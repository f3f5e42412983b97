//! Fingerprint-based deduplication.
//!
//! Two items are duplicates when their type tag, natural key, and payload
//! serialize identically and they arrive within the configured window.
//! Item ids and retry counters are deliberately excluded from the
//! fingerprint.

use chrono::{DateTime, Duration, Utc};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use tickpipe_core::PersistenceItem;

/// Prune the seen-map once it grows past this many fingerprints.
const PRUNE_THRESHOLD: usize = 4096;

pub struct Deduplicator {
    window: Duration,
    seen: HashMap<u64, DateTime<Utc>>,
}

impl Deduplicator {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window: Duration::milliseconds(window_ms as i64),
            seen: HashMap::new(),
        }
    }

    /// Returns true if `item` duplicates one seen within the window.
    /// First sightings are recorded; duplicates do not extend the window.
    pub fn check_and_record(&mut self, item: &PersistenceItem, now: DateTime<Utc>) -> bool {
        let fp = Self::fingerprint(item);

        if let Some(first_seen) = self.seen.get(&fp) {
            if now - *first_seen <= self.window {
                return true;
            }
        }

        self.seen.insert(fp, now);
        if self.seen.len() > PRUNE_THRESHOLD {
            self.prune(now);
        }
        false
    }

    fn fingerprint(item: &PersistenceItem) -> u64 {
        let mut hasher = DefaultHasher::new();
        item.item_type.to_string().hash(&mut hasher);
        item.payload.natural_key().hash(&mut hasher);
        serde_json::to_string(&item.payload)
            .unwrap_or_default()
            .hash(&mut hasher);
        hasher.finish()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let window = self.window;
        self.seen.retain(|_, seen_at| now - *seen_at <= window);
    }

    pub fn tracked(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tickpipe_core::{ItemPayload, Price, PriceRecord};

    fn item(symbol: &str, price: rust_decimal::Decimal, ts: DateTime<Utc>) -> PersistenceItem {
        PersistenceItem::new(ItemPayload::Price(PriceRecord::new(
            symbol,
            Price::new(price),
            ts,
            "binance",
        )))
    }

    #[test]
    fn test_same_payload_within_window_is_duplicate() {
        let mut dedup = Deduplicator::new(30_000);
        let now = Utc::now();
        let ts = now - Duration::seconds(1);

        // Distinct ids, identical payloads.
        let a = item("BTCUSDT", dec!(100), ts);
        let b = item("BTCUSDT", dec!(100), ts);
        assert_ne!(a.id, b.id);

        assert!(!dedup.check_and_record(&a, now));
        assert!(dedup.check_and_record(&b, now));
    }

    #[test]
    fn test_different_payloads_not_duplicates() {
        let mut dedup = Deduplicator::new(30_000);
        let now = Utc::now();
        let ts = now - Duration::seconds(1);

        assert!(!dedup.check_and_record(&item("BTCUSDT", dec!(100), ts), now));
        assert!(!dedup.check_and_record(&item("BTCUSDT", dec!(101), ts), now));
        assert!(!dedup.check_and_record(&item("ETHUSDT", dec!(100), ts), now));
    }

    #[test]
    fn test_window_expiry_allows_resubmission() {
        let mut dedup = Deduplicator::new(1000);
        let t0 = Utc::now();
        let ts = t0 - Duration::seconds(1);

        let a = item("BTCUSDT", dec!(100), ts);
        let b = item("BTCUSDT", dec!(100), ts);

        assert!(!dedup.check_and_record(&a, t0));
        // Past the window: no longer a duplicate.
        assert!(!dedup.check_and_record(&b, t0 + Duration::seconds(2)));
    }
}
