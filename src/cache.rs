//! Process-lifetime response cache.
//!
//! Entries are keyed by request identity and judged fresh against a TTL given
//! at lookup time. Stale entries stay in place until the next successful
//! `store` for the same key replaces them; there is no capacity bound and no
//! eviction.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::clock::Clock;

/// One cached value and the time it was stored
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub key: String,
    pub stored_at: DateTime<Utc>,
    pub value: V,
}

impl<V> CacheEntry<V> {
    /// Strict freshness: an entry exactly `ttl` old is already stale
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        // A timestamp in the future (clock moved backwards) counts as age zero
        let age = (now - self.stored_at).to_std().unwrap_or_default();
        age < ttl
    }
}

#[derive(Debug)]
pub struct ResponseCache<V = Value> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Return the entry for `key` if it is younger than `ttl`
    pub fn lookup(&self, key: &str, ttl: Duration) -> Option<CacheEntry<V>> {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        match entries.get(key) {
            Some(entry) if entry.is_fresh(now, ttl) => Some(entry.clone()),
            Some(entry) => {
                debug!("Cache entry for {} is stale (stored at {})", key, entry.stored_at);
                None
            }
            None => None,
        }
    }

    /// Replace whatever is stored under `key`, stamping it with the current time
    pub fn store(&self, key: &str, value: V) {
        let entry = CacheEntry {
            key: key.to_string(),
            stored_at: self.clock.now(),
            value,
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
    }

    /// Number of entries held, stale ones included
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
