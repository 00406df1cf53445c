//! Memoization front-end over [`CacheStore`]
//!
//! The cache key is a SHA-256 digest of `(operation_path, arguments)`. The
//! arguments are hashed in their serialized form, so field order is part of
//! the signature exactly as the caller serialized it.
//!
//! Eviction is coarse: at each run boundary the whole store is dropped if it
//! holds more than `threshold` entries, otherwise everything survives into the
//! next run.

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::store::{CacheKey, CacheStore};
use crate::config::DEFAULT_EVICTION_THRESHOLD;

/// Aggregate cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently stored
    pub entries: usize,
    /// Lookups answered from the store
    pub hits: u64,
    /// Lookups that had to compute
    pub misses: u64,
    /// Whole-store clears (threshold evictions and explicit clears)
    pub evictions: u64,
}

/// Memoizes pure operation results and bounds the store across runs
#[derive(Debug)]
pub struct CacheHelper {
    store: CacheStore,
    threshold: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Default for CacheHelper {
    fn default() -> Self {
        Self::new(DEFAULT_EVICTION_THRESHOLD)
    }
}

impl CacheHelper {
    pub fn new(threshold: usize) -> Self {
        Self {
            store: CacheStore::new(),
            threshold,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Build the cache key for a call.
    ///
    /// Length-prefixed so `("a.b", "c")` and `("a", ".bc")` cannot collide.
    pub fn cache_key(operation_path: &str, inputs: &Value) -> CacheKey {
        let inputs = inputs.to_string();
        let mut hasher = Sha256::new();
        hasher.update((operation_path.len() as u64).to_le_bytes());
        hasher.update(operation_path.as_bytes());
        hasher.update((inputs.len() as u64).to_le_bytes());
        hasher.update(inputs.as_bytes());
        CacheKey::from_digest(format!("{:x}", hasher.finalize()))
    }

    /// Return the memoized result for this call, computing and storing it on a
    /// miss. Errors from `compute` are returned as-is and never stored.
    pub fn cache_op<E>(
        &mut self,
        operation_path: &str,
        inputs: &Value,
        compute: impl FnOnce() -> Result<Value, E>,
    ) -> Result<Value, E> {
        let key = Self::cache_key(operation_path, inputs);
        if let Some(value) = self.store.get(&key) {
            self.hits += 1;
            debug!(key = %key.short(), path = operation_path, "Cache hit");
            return Ok(value.clone());
        }

        self.misses += 1;
        debug!(key = %key.short(), path = operation_path, "Cache miss, computing");
        let value = compute()?;
        self.store.insert(key, value.clone());
        Ok(value)
    }

    /// Apply the run-boundary eviction check. Returns `true` if the store was
    /// cleared.
    pub fn on_run_boundary(&mut self) -> bool {
        let entries = self.store.len();
        if entries > self.threshold {
            self.store.clear();
            self.evictions += 1;
            info!(
                "Cache held {} entries (threshold {}), cleared at run boundary",
                entries, self.threshold
            );
            true
        } else {
            debug!(entries, threshold = self.threshold, "Run boundary, cache kept");
            false
        }
    }

    /// Unconditionally empty the store, returning how many entries were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.store.clear();
        self.evictions += 1;
        info!("Cache cleared on request ({} entries dropped)", dropped);
        dropped
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn contains(&self, operation_path: &str, inputs: &Value) -> bool {
        self.store.contains(&Self::cache_key(operation_path, inputs))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.store.len(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }
}
