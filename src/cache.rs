// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Short-lived response cache for read-heavy list queries.
//!
//! Fronts remote queries during rapid UI refresh. Entries expire after a
//! few seconds and every write that could change a result set must call
//! [`ResponseCache::invalidate`] (or `clear`).

use dashmap::DashMap;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// TTL cache keyed by query string.
pub struct ResponseCache<V: Clone> {
    entries: DashMap<String, Entry<V>>,
    ttl: Duration,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Get a cached value if present and fresh.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.stored_at.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.insert(
            key.into(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop one key.
    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_hit_and_invalidate() {
        let cache: ResponseCache<Vec<u32>> = ResponseCache::new(Duration::from_secs(5));
        cache.insert("squad:a", vec![1, 2]);

        assert_eq!(cache.get("squad:a"), Some(vec![1, 2]));
        assert_eq!(cache.get("squad:b"), None);

        cache.invalidate("squad:a");
        assert_eq!(cache.get("squad:a"), None);
    }

    #[test]
    fn test_cache_expiry() {
        let cache: ResponseCache<u32> = ResponseCache::new(Duration::from_millis(0));
        cache.insert("k", 7);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
    }
}
