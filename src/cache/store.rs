use super::entry::CacheEntry;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Keyed table of settled outcomes for one execution context.
///
/// Knows nothing about networking or in-flight work; the coordinator writes
/// into it and the codec snapshots it.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl CacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Writers only insert or swap whole values, so a poisoned table is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.read();
        match entries.get(key) {
            Some(entry) => {
                debug!("Cache HIT: {}", key);
                Some(entry.clone())
            }
            None => {
                debug!("Cache MISS: {}", key);
                None
            }
        }
    }

    /// Overwrites the entry for `key`. Entries that never completed are refused.
    pub fn put(&self, key: &str, entry: CacheEntry) {
        if !entry.is_settled() {
            warn!("Refusing to store unsettled entry for {}", key);
            return;
        }
        info!(
            "Cache STORE: {} ({})",
            key,
            if entry.has_data() { "resolved" } else { "failed" }
        );
        self.write().insert(key.to_string(), entry);
    }

    #[must_use]
    pub fn contains_data(&self, key: &str) -> bool {
        self.read().get(key).is_some_and(CacheEntry::has_data)
    }

    /// Every settled entry, detached from the live table.
    #[must_use]
    pub fn snapshot_all(&self) -> HashMap<String, CacheEntry> {
        self.read()
            .iter()
            .filter(|(_, entry)| entry.is_settled())
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }

    /// Swaps in `entries` wholesale; keys absent from `entries` are dropped.
    pub fn replace_all(&self, entries: HashMap<String, CacheEntry>) {
        let entries: HashMap<String, CacheEntry> = entries
            .into_iter()
            .filter(|(_, entry)| entry.is_settled())
            .collect();
        info!("Cache REPLACE: {} entries", entries.len());
        *self.write() = entries;
    }

    pub fn clear(&self) {
        self.write().clear();
        info!("Cache CLEAR");
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let entries = self.read();
        let resolved_entries = entries.values().filter(|e| e.has_data()).count();

        CacheStats {
            total_entries: entries.len(),
            resolved_entries,
            failed_entries: entries.len() - resolved_entries,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub resolved_entries: usize,
    pub failed_entries: usize,
}
