//! Bounded LRU cache of parsed LUTs with pinning.

use std::sync::Arc;

use lru::LruCache;

use super::LutData;
use crate::error::LutError;

/// Default number of LUTs kept in memory.
pub const DEFAULT_CAPACITY: usize = 5;

struct CacheEntry {
    lut: Arc<LutData>,
    pins: u32,
}

/// LRU cache keyed by source identifier.
///
/// Capacity is enforced here rather than by `LruCache` itself so eviction
/// can skip pinned entries: the active LUT is never evicted while in use.
pub struct LutCache {
    entries: LruCache<String, CacheEntry>,
    capacity: usize,
}

impl LutCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up and promote to most-recently-used.
    pub fn get(&mut self, key: &str) -> Option<Arc<LutData>> {
        self.entries.get(key).map(|e| Arc::clone(&e.lut))
    }

    /// Membership test without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Insert (or replace) an entry as most-recently-used.
    ///
    /// At capacity the least-recently-used unpinned entry is evicted first
    /// and its key returned. Pins on a replaced entry are kept.
    pub fn insert(&mut self, key: &str, lut: Arc<LutData>) -> Result<Option<String>, LutError> {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.lut = lut;
            return Ok(None);
        }

        let mut evicted = None;
        if self.entries.len() >= self.capacity {
            let victim = self
                .entries
                .iter()
                .rev()
                .find(|(_, e)| e.pins == 0)
                .map(|(k, _)| k.clone());
            let Some(victim) = victim else {
                return Err(LutError::CacheFull(key.to_string()));
            };
            self.entries.pop(&victim);
            tracing::debug!("evicted LUT `{victim}` for `{key}`");
            evicted = Some(victim);
        }

        self.entries.put(key.to_string(), CacheEntry { lut, pins: 0 });
        Ok(evicted)
    }

    /// Protect an entry from eviction. Returns false if the key is absent.
    pub fn pin(&mut self, key: &str) -> bool {
        match self.entries.peek_mut(key) {
            Some(entry) => {
                entry.pins += 1;
                true
            }
            None => false,
        }
    }

    pub fn unpin(&mut self, key: &str) {
        if let Some(entry) = self.entries.peek_mut(key) {
            entry.pins = entry.pins.saturating_sub(1);
        }
    }

    pub fn is_pinned(&self, key: &str) -> bool {
        self.entries.peek(key).is_some_and(|e| e.pins > 0)
    }

    /// Keys from most- to least-recently-used.
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }
}
