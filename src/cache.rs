//! Resolved stem URL cache.
//! Read-through on every resolution, write-through on success, persisted as a
//! single JSON document in durable storage. Entries never expire on their own;
//! stale URLs are cleared with `remove`/`clear`.

use crate::db::KeyValueStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedUrlCacheEntry {
    pub key: String,
    pub url: String,
    pub resolved_at: DateTime<Utc>,
}

/// Cache key for a stem of a track: case-folded `track:stem`.
pub fn cache_key(track_title: &str, stem_name: &str) -> String {
    format!(
        "{}:{}",
        track_title.trim().to_lowercase(),
        stem_name.trim().to_lowercase()
    )
}

pub struct UrlCache {
    entries: HashMap<String, ResolvedUrlCacheEntry>,
    store: Rc<dyn KeyValueStore>,
    storage_key: String,
}

impl UrlCache {
    /// Load persisted entries. An unreadable document starts an empty cache.
    pub fn load(store: Rc<dyn KeyValueStore>, storage_key: impl Into<String>) -> Self {
        let storage_key = storage_key.into();
        let entries = store
            .get(&storage_key)
            .and_then(|json| {
                serde_json::from_str::<Vec<ResolvedUrlCacheEntry>>(&json)
                    .map_err(|err| {
                        tracing::warn!(target: "stemstore::cache", "discarding unreadable url cache: {err}");
                    })
                    .ok()
            })
            .unwrap_or_default()
            .into_iter()
            .filter(|entry| !entry.url.trim().is_empty())
            .map(|entry| (entry.key.clone(), entry))
            .collect();

        Self {
            entries,
            store,
            storage_key,
        }
    }

    pub fn get(&self, key: &str) -> Option<&ResolvedUrlCacheEntry> {
        self.entries.get(key)
    }

    pub fn url(&self, key: &str) -> Option<String> {
        self.get(key).map(|entry| entry.url.clone())
    }

    /// Insert (or overwrite) an entry and persist. Storage failures are
    /// logged and leave the in-memory entry in place.
    pub fn insert(&mut self, key: impl Into<String>, url: impl Into<String>, resolved_at: DateTime<Utc>) {
        let key = key.into();
        let entry = ResolvedUrlCacheEntry {
            key: key.clone(),
            url: url.into(),
            resolved_at,
        };
        self.entries.insert(key, entry);
        self.persist();
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.persist();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        if let Err(err) = self.store.remove(&self.storage_key) {
            tracing::warn!(target: "stemstore::cache", "failed to clear url cache: {err}");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) {
        let mut entries: Vec<&ResolvedUrlCacheEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        let result = serde_json::to_string(&entries)
            .map_err(crate::db::StoreError::from)
            .and_then(|json| self.store.set(&self.storage_key, &json));
        if let Err(err) = result {
            tracing::warn!(target: "stemstore::cache", "url cache write failed: {err}");
        }
    }
}
