//! Cache entries, freshness rules and cache-key derivation.

pub mod memory;

use std::{
    hash::Hasher,
    time::{SystemTime, UNIX_EPOCH},
};

use fnv::FnvHasher;
use serde_json::Value as JsonValue;

use crate::model::epoch_millis;

pub use memory::MemoryCache;

pub const LAYER_KEY_SUFFIX: &str = "::layer";
pub const CATALOG_KEY_SUFFIX: &str = "::catalog";

/// A value read back from a cache backend.
///
/// Older backends record the expiry next to the payload under `_cache`;
/// newer ones write `metadata.expires`. When a `_cache` marker is present it
/// is authoritative and `metadata` is not consulted.
#[derive(Debug, Clone, Copy)]
pub struct CacheEntry<'a> {
    value: &'a JsonValue,
}

impl<'a> CacheEntry<'a> {
    pub fn new(value: &'a JsonValue) -> Self {
        Self { value }
    }

    /// Recorded expiry in epoch milliseconds, if any.
    pub fn expires(&self) -> Option<i64> {
        let marker = self
            .value
            .get("_cache")
            .filter(|m| m.is_object())
            .or_else(|| self.value.get("metadata"))?;

        marker
            .get("expires")
            .and_then(epoch_millis)
            .filter(|e| *e != 0)
    }

    /// Usable iff no expiry is recorded or `now_ms` is strictly before it.
    pub fn is_usable_at(&self, now_ms: i64) -> bool {
        match self.expires() {
            None => true,
            Some(expires) => now_ms < expires,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.is_usable_at(now_millis())
    }
}

/// Whether a lookup result can be served without asking the provider.
pub fn should_use_cache(entry: Option<&JsonValue>) -> bool {
    entry.is_some_and(|value| CacheEntry::new(value).is_usable())
}

/// Stable FNV-1a hash of a request identity.
pub fn hash_key(identity: &str) -> String {
    let mut hasher = FnvHasher::default();
    hasher.write(identity.as_bytes());
    hasher.finish().to_string()
}

pub fn layer_key(base: &str) -> String {
    format!("{base}{LAYER_KEY_SUFFIX}")
}

pub fn catalog_key(base: &str) -> String {
    format!("{base}{CATALOG_KEY_SUFFIX}")
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
