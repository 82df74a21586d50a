use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as JsonValue;

use crate::core::{CacheBackend, FeatureServerResult};

struct MemoryEntry {
    value: JsonValue,
    expires_at: Instant,
}

/// In-process cache backend.
///
/// Expired entries are evicted on read and reported as absent, so values
/// never carry expiry markers of their own.
pub struct MemoryCache {
    entries: DashMap<String, MemoryEntry>,
    max_entries: Option<usize>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: None,
        }
    }

    /// Bound the number of stored entries
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: Some(max_entries.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove `key` only if it is still expired at `now`; a value
    /// re-inserted since the caller looked is left alone.
    fn evict_if_expired(&self, key: &str, now: Instant) -> bool {
        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= now)
            .is_some()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    fn make_room(&self) {
        let Some(max) = self.max_entries else {
            return;
        };
        if self.entries.len() < max {
            return;
        }
        let purged = self.purge_expired();
        if purged > 0 && self.entries.len() < max {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().expires_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            log::debug!("Memory cache full, evicting '{key}'");
            self.entries.remove(&key);
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn retrieve(
        &self,
        key: &str,
        _context: &JsonValue,
    ) -> FeatureServerResult<Option<JsonValue>> {
        let now = Instant::now();
        match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }

        if self.evict_if_expired(key, now) {
            log::trace!("Memory cache entry '{key}' expired");
        }
        Ok(None)
    }

    async fn insert(&self, key: &str, value: JsonValue, ttl: Duration) -> FeatureServerResult<()> {
        if !self.entries.contains_key(key) {
            self.make_room();
        }
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}
