//! Same-key merging of pending items.
//!
//! Collapses redundant writes before they reach the sink. Items group by
//! type tag and natural key; singleton groups pass through unchanged.
//! Items whose payload does not match their tag, and unknown types, are
//! never dropped: they pass through unmerged.

use std::collections::HashMap;
use tickpipe_core::{ItemPayload, ItemType, PersistenceItem};

/// Result of one merge pass.
#[derive(Debug)]
pub struct MergeOutcome {
    /// Surviving items, merged groups first, passthrough items last.
    pub items: Vec<PersistenceItem>,
    /// How many items were collapsed away into merged ones.
    pub collapsed: u64,
}

/// Stateless merger applying per-type policies.
pub struct Merger;

impl Merger {
    pub fn merge(items: Vec<PersistenceItem>) -> MergeOutcome {
        let mut groups: Vec<Vec<PersistenceItem>> = Vec::new();
        let mut index: HashMap<(ItemType, String), usize> = HashMap::new();
        let mut passthrough: Vec<PersistenceItem> = Vec::new();

        for item in items {
            let unknown_type = matches!(item.item_type, ItemType::Other(_));
            let key = match item.payload.natural_key() {
                Some(key) if !unknown_type && item.tag_matches_payload() => key,
                _ => {
                    passthrough.push(item);
                    continue;
                }
            };
            let key = (item.item_type.clone(), key);
            match index.get(&key).copied() {
                Some(i) => groups[i].push(item),
                None => {
                    index.insert(key, groups.len());
                    groups.push(vec![item]);
                }
            }
        }

        let mut out = Vec::with_capacity(groups.len() + passthrough.len());
        let mut collapsed = 0u64;
        for mut group in groups {
            if group.len() == 1 {
                out.push(group.pop().expect("singleton group"));
                continue;
            }
            collapsed += (group.len() - 1) as u64;
            group.sort_by_key(|item| item.timestamp);
            out.push(Self::merge_group(group));
        }
        out.extend(passthrough);

        MergeOutcome {
            items: out,
            collapsed,
        }
    }

    /// Merge one chronologically sorted group of same-type, same-key items
    /// into its latest item.
    fn merge_group(mut group: Vec<PersistenceItem>) -> PersistenceItem {
        let count = group.len();
        let mut latest = group.pop().expect("non-empty group");

        match &mut latest.payload {
            ItemPayload::Price(record) => {
                // Latest identity; volume summed and latency averaged
                // across the whole group.
                let mut volume = record.volume;
                let mut latencies: Vec<i64> = record.latency_ms.into_iter().collect();
                for earlier in &group {
                    if let ItemPayload::Price(r) = &earlier.payload {
                        volume += r.volume;
                        latencies.extend(r.latency_ms);
                    }
                }
                record.volume = volume;
                record.latency_ms = if latencies.is_empty() {
                    None
                } else {
                    Some(latencies.iter().sum::<i64>() / latencies.len() as i64)
                };
                record.source = format!("merged_{count}_sources");
            }
            ItemPayload::ChangeRate(rate) => {
                // Average the rate over valid entries only; with none
                // valid, the latest value stands unmodified.
                let mut valid_rates = Vec::new();
                for earlier in &group {
                    if let ItemPayload::ChangeRate(r) = &earlier.payload {
                        if r.valid {
                            valid_rates.push(r.rate_pct);
                        }
                    }
                }
                if rate.valid {
                    valid_rates.push(rate.rate_pct);
                }
                if !valid_rates.is_empty() {
                    let sum: rust_decimal::Decimal = valid_rates.iter().sum();
                    rate.rate_pct = sum / rust_decimal::Decimal::from(valid_rates.len() as u64);
                }
            }
            ItemPayload::SymbolInfo(info) => {
                info.updated_at = latest.timestamp;
            }
            ItemPayload::Raw(_) => {}
        }

        latest
    }
}
