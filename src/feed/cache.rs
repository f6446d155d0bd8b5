use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

// chrono panics on durations past ~292 million years; ten years is plenty
const MAX_TTL_SECS: u64 = 10 * 365 * 86_400;

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Per-identifier memo of fetch results with an explicit expiry timestamp.
///
/// Callers own the cache and hand it to the fetch functions, so lifetime and
/// sharing are decided at the call site. `now` is always passed in.
#[derive(Debug, Clone)]
pub struct FetchCache<T> {
    ttl: Duration,
    entries: HashMap<String, CacheEntry<T>>,
}

impl<T> FetchCache<T> {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64),
            entries: HashMap::new(),
        }
    }

    /// Fresh value for `key`; entries at or past their expiry are ignored.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<&T> {
        self.entries
            .get(key)
            .filter(|e| now < e.expires_at)
            .map(|e| &e.value)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: T, now: DateTime<Utc>) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                fetched_at: now,
                expires_at: now + self.ttl,
            },
        );
    }

    pub fn entry(&self, key: &str) -> Option<&CacheEntry<T>> {
        self.entries.get(key)
    }

    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(key).map(|e| e.expires_at)
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| now < e.expires_at);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
