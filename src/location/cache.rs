//! In-memory result cache for resolved geography lists.
//!
//! Write-once per key, no TTL, no eviction. Lives as long as its owner:
//! a single resolver session, or the whole process when shared.

use super::types::{CacheKey, CachedList, Country};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedList,
    fetched_at: DateTime<Utc>,
}

/// One row of [`ResultCache::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryInfo {
    pub key: String,
    pub items: usize,
    pub fetched_at: DateTime<Utc>,
}

/// The result cache.
#[derive(Default)]
pub struct ResultCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedList> {
        self.entries.lock().get(key).map(|e| e.value.clone())
    }

    pub fn has(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Store a value. The first write for a key wins; later writes are
    /// ignored and return `false`.
    pub fn set(&self, key: CacheKey, value: CachedList) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, CacheEntry { value, fetched_at: Utc::now() });
        true
    }

    /// The cached country list, if resolved.
    pub fn countries(&self) -> Option<Vec<Country>> {
        match self.get(&CacheKey::countries())? {
            CachedList::Countries(c) => Some(c),
            CachedList::Names(_) => None,
        }
    }

    /// A cached province or city list.
    pub fn names(&self, key: &CacheKey) -> Option<Vec<String>> {
        match self.get(key)? {
            CachedList::Names(n) => Some(n),
            CachedList::Countries(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every entry, sorted by key.
    pub fn stats(&self) -> Vec<CacheEntryInfo> {
        let entries = self.entries.lock();
        let mut out: Vec<CacheEntryInfo> = entries
            .iter()
            .map(|(k, e)| CacheEntryInfo {
                key: k.to_string(),
                items: e.value.len(),
                fetched_at: e.fetched_at,
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }
}
