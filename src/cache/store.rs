//! Concurrent response store.

use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;

use crate::cache::entry::CachedEntry;

/// Thread-safe map from absolute URL to cached response.
///
/// Cloning the handle shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    inner: Arc<DashMap<String, Arc<CachedEntry>>>,
}

impl ResponseCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a fresh entry. Stale entries read as absent and are left in place.
    pub fn lookup(&self, key: &str) -> Option<Arc<CachedEntry>> {
        let now = SystemTime::now();
        self.inner
            .get(key)
            .filter(|entry| entry.is_fresh_at(now))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Insert or overwrite the slot for `key`.
    pub fn store(&self, key: impl Into<String>, entry: CachedEntry) {
        let key = key.into();
        tracing::debug!(key = %key, body_bytes = entry.body().len(), "Cache store");
        self.inner.insert(key, Arc::new(entry));
    }

    /// Drop every stale entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = SystemTime::now();
        let mut removed = 0;
        self.inner.retain(|_, entry| {
            let keep = entry.is_fresh_at(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// All entries, fresh or not, sorted by key.
    pub fn snapshot(&self) -> Vec<(String, Arc<CachedEntry>)> {
        let mut entries: Vec<_> = self
            .inner
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
