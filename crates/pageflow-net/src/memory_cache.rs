//! Bounded in-memory cache
//!
//! Fallback store used when the background cache is unavailable.
//! Least-recently-used entries are evicted once capacity is reached.

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::CachedResponse;

/// LRU cache keyed by resource URL
#[derive(Debug)]
pub struct MemoryCache {
    entries: LruCache<String, CachedResponse>,
    evictions: u64,
}

impl MemoryCache {
    /// Create with capacity (clamped to at least one entry)
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            evictions: 0,
        }
    }

    /// Lookup and mark as most recently used
    pub fn get(&mut self, url: &str) -> Option<CachedResponse> {
        self.entries.get(url).cloned()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains(url)
    }

    /// Insert or replace; returns the entry evicted to make room, if any
    pub fn put(&mut self, entry: CachedResponse) -> Option<CachedResponse> {
        let url = entry.url.clone();
        match self.entries.push(url.clone(), entry) {
            Some((evicted_url, evicted)) if evicted_url != url => {
                self.evictions += 1;
                tracing::debug!("Memory cache evicted {}", evicted_url);
                Some(evicted)
            }
            _ => None,
        }
    }

    pub fn remove(&mut self, url: &str) -> Option<CachedResponse> {
        self.entries.pop(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// URLs from most to least recently used
    pub fn urls(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
