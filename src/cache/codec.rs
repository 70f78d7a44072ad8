//! Handoff payload between a producer context and a consumer context.
//!
//! The payload is a JSON object mapping key to `{data, error, timestamp}`.
//! Only settled entries are written; in-flight fetches live in a separate
//! registry and never reach this module.

use super::entry::CacheEntry;
use super::store::CacheStore;
use crate::error::Result;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{error, info, warn};

/// Serialize every settled entry of `store`.
///
/// # Errors
///
/// Returns an error if an entry payload cannot be serialized.
pub fn encode(store: &CacheStore) -> Result<String> {
    // Sorted keys keep the payload stable for identical stores
    let snapshot: BTreeMap<String, CacheEntry> = store.snapshot_all().into_iter().collect();
    Ok(serde_json::to_string(&snapshot)?)
}

/// Parse a handoff payload back into entries.
///
/// A present `data` field is cached data even when it is `null`, unless the
/// entry also carries an `error`. Entries with neither never completed and are
/// skipped.
///
/// # Errors
///
/// Returns an error if the payload is not a JSON object of well-formed entries.
pub fn decode(payload: &str) -> Result<HashMap<String, CacheEntry>> {
    let raw: HashMap<String, Value> = serde_json::from_str(payload)?;

    let mut entries = HashMap::with_capacity(raw.len());
    for (key, value) in raw {
        let mut entry: CacheEntry = serde_json::from_value(value)?;
        if entry.error.is_some() && entry.data == Some(Value::Null) {
            entry.data = None;
        }
        if entry.is_settled() {
            entries.insert(key, entry);
        } else {
            warn!("Skipping unsettled handoff entry: {}", key);
        }
    }

    Ok(entries)
}

/// Replace the contents of `store` with a decoded handoff payload.
///
/// An empty payload is a no-op. A malformed payload is logged and leaves
/// `store` untouched, so callers can continue startup with an empty cache.
///
/// # Errors
///
/// Returns the decode error after logging it.
pub fn hydrate(store: &CacheStore, payload: &str) -> Result<usize> {
    if payload.trim().is_empty() {
        return Ok(0);
    }

    match decode(payload) {
        Ok(entries) => {
            let count = entries.len();
            store.replace_all(entries);
            info!("Hydrated cache with {} entries", count);
            Ok(count)
        }
        Err(e) => {
            error!("Failed to initialize cache: {}", e);
            Err(e)
        }
    }
}
