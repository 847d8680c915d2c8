//! Cache Coordinator
//!
//! Every load goes through here. The per-type policy decides whether a
//! cached copy is served, revalidated or only used as a network fallback.
//! Storage is delegated to the host's background cache; when that is
//! missing or starts failing, the coordinator degrades to a bounded
//! in-memory LRU for the rest of the page's life.

use serde::{Deserialize, Serialize};

use crate::fetch::{FetchMode, FetchRequest, Fetcher};
use crate::manifest::PolicyManifest;
use crate::memory_cache::MemoryCache;
use crate::{NetError, ResourceType};

// ============================================================================
// Policy
// ============================================================================

/// Caching strategy for a resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    /// Serve from cache when present, fetch otherwise
    CacheFirst,
    /// Serve cached copy immediately and refresh it in the background
    StaleWhileRevalidate,
    /// Always fetch; cached copy only used when the fetch fails
    NetworkFirst,
}

impl CachePolicy {
    pub fn for_type(resource_type: ResourceType) -> Self {
        match resource_type {
            ResourceType::Image => Self::CacheFirst,
            ResourceType::Script | ResourceType::Stylesheet => Self::StaleWhileRevalidate,
            ResourceType::Video => Self::NetworkFirst,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheFirst => "cache-first",
            Self::StaleWhileRevalidate => "stale-while-revalidate",
            Self::NetworkFirst => "network-first",
        }
    }
}

// ============================================================================
// Entries and errors
// ============================================================================

/// Cached response metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResponse {
    pub url: String,
    pub resource_type: ResourceType,
    pub byte_size: u64,
    pub stored_at_ms: f64,
}

impl CachedResponse {
    pub fn new(url: &str, resource_type: ResourceType, byte_size: u64, stored_at_ms: f64) -> Self {
        Self {
            url: url.to_string(),
            resource_type,
            byte_size,
            stored_at_ms,
        }
    }
}

/// Cache failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    #[error("background cache unavailable: {0}")]
    Unavailable(String),

    #[error("background cache storage failed: {0}")]
    Storage(String),

    #[error("policy manifest rejected: {0}")]
    Manifest(String),
}

/// Host-provided persistent cache (service-worker style)
pub trait BackgroundCache {
    /// Probed once when the coordinator is built
    fn is_available(&self) -> bool;

    fn lookup(&mut self, url: &str) -> Result<Option<CachedResponse>, CacheError>;

    fn store(&mut self, entry: CachedResponse) -> Result<(), CacheError>;

    fn sync_manifest(&mut self, manifest: &PolicyManifest) -> Result<(), CacheError>;
}

/// Outcome of routing a load through the cache
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOutcome {
    /// Served from cache, nothing fetched
    Served(CachedResponse),
    /// Served from cache, refresh fetch issued
    ServedRevalidating(CachedResponse),
    /// Network fetch issued; completion reported later
    Fetching,
}

impl CacheOutcome {
    pub fn is_hit(&self) -> bool {
        !matches!(self, CacheOutcome::Fetching)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub revalidations: u64,
    pub fallbacks_served: u64,
    pub stores: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// hits / (hits + misses), 0 when nothing was requested
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

enum Backend {
    Background(Box<dyn BackgroundCache>),
    Memory(MemoryCache),
}

/// Applies cache policy to every load
pub struct CacheCoordinator {
    backend: Backend,
    memory_capacity: usize,
    stats: CacheStats,
    faults: Vec<CacheError>,
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("degraded", &self.is_degraded())
            .field("memory_capacity", &self.memory_capacity)
            .field("stats", &self.stats)
            .finish()
    }
}

impl CacheCoordinator {
    /// Use `background` when present and available, otherwise a memory LRU
    pub fn new(background: Option<Box<dyn BackgroundCache>>, memory_capacity: usize) -> Self {
        let mut faults = Vec::new();
        let backend = match background {
            Some(cache) if cache.is_available() => Backend::Background(cache),
            Some(_) => {
                let err = CacheError::Unavailable("background cache reported unavailable".into());
                tracing::warn!("{}; using {}-entry memory cache", err, memory_capacity);
                faults.push(err);
                Backend::Memory(MemoryCache::new(memory_capacity))
            }
            None => {
                let err = CacheError::Unavailable("no background cache registered".into());
                tracing::warn!("{}; using {}-entry memory cache", err, memory_capacity);
                faults.push(err);
                Backend::Memory(MemoryCache::new(memory_capacity))
            }
        };

        Self {
            backend,
            memory_capacity,
            stats: CacheStats::default(),
            faults,
        }
    }

    /// Memory-only coordinator
    pub fn in_memory(memory_capacity: usize) -> Self {
        Self {
            backend: Backend::Memory(MemoryCache::new(memory_capacity)),
            memory_capacity,
            stats: CacheStats::default(),
            faults: Vec::new(),
        }
    }

    /// True when running on the memory fallback
    pub fn is_degraded(&self) -> bool {
        matches!(self.backend, Backend::Memory(_))
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats;
        if let Backend::Memory(memory) = &self.backend {
            stats.evictions = memory.evictions();
        }
        stats
    }

    pub fn memory(&self) -> Option<&MemoryCache> {
        match &self.backend {
            Backend::Memory(memory) => Some(memory),
            Backend::Background(_) => None,
        }
    }

    /// Errors absorbed since the last call (for alert recording)
    pub fn take_faults(&mut self) -> Vec<CacheError> {
        std::mem::take(&mut self.faults)
    }

    /// Route a load through the policy for its type
    pub fn request(&mut self, request: &FetchRequest, fetcher: &mut dyn Fetcher) -> Result<CacheOutcome, NetError> {
        match CachePolicy::for_type(request.resource_type) {
            CachePolicy::CacheFirst => {
                if let Some(hit) = self.lookup(&request.url) {
                    self.stats.hits += 1;
                    tracing::debug!("Cache hit for {}", request.url);
                    return Ok(CacheOutcome::Served(hit));
                }
                self.stats.misses += 1;
                self.fetch(request, fetcher)?;
                Ok(CacheOutcome::Fetching)
            }
            CachePolicy::StaleWhileRevalidate => {
                if let Some(hit) = self.lookup(&request.url) {
                    self.stats.hits += 1;
                    let refresh = FetchRequest {
                        mode: FetchMode::Revalidate,
                        ..request.clone()
                    };
                    // The stale copy is already usable, a failed refresh is not a load failure
                    match self.fetch(&refresh, fetcher) {
                        Ok(()) => self.stats.revalidations += 1,
                        Err(e) => tracing::warn!("Revalidation of {} not started: {}", request.url, e),
                    }
                    return Ok(CacheOutcome::ServedRevalidating(hit));
                }
                self.stats.misses += 1;
                self.fetch(request, fetcher)?;
                Ok(CacheOutcome::Fetching)
            }
            CachePolicy::NetworkFirst => {
                self.stats.misses += 1;
                match self.fetch(request, fetcher) {
                    Ok(()) => Ok(CacheOutcome::Fetching),
                    Err(e) => match self.fallback(&request.url) {
                        Some(cached) => Ok(CacheOutcome::Served(cached)),
                        None => Err(e),
                    },
                }
            }
        }
    }

    /// Cached copy to use after a network-first fetch failed; the request's
    /// miss becomes a hit
    pub fn fallback(&mut self, url: &str) -> Option<CachedResponse> {
        let cached = self.lookup(url)?;
        self.stats.misses = self.stats.misses.saturating_sub(1);
        self.stats.hits += 1;
        self.stats.fallbacks_served += 1;
        tracing::debug!("Serving cached fallback for {}", url);
        Some(cached)
    }

    /// Store the result of a completed fetch
    pub fn complete(&mut self, url: &str, resource_type: ResourceType, byte_size: u64, now_ms: f64) {
        self.store(CachedResponse::new(url, resource_type, byte_size, now_ms));
    }

    /// Send the manifest to the background cache (no-op on the memory fallback)
    pub fn sync_manifest(&mut self, manifest: &PolicyManifest) {
        let result = match &mut self.backend {
            Backend::Background(cache) => cache.sync_manifest(manifest),
            Backend::Memory(_) => return,
        };
        match result {
            Ok(()) => tracing::debug!("Synced policy manifest ({} entries)", manifest.len()),
            Err(CacheError::Manifest(reason)) => {
                tracing::warn!("Policy manifest rejected: {}", reason);
                self.faults.push(CacheError::Manifest(reason));
            }
            Err(e) => self.degrade(e),
        }
    }

    fn fetch(&mut self, request: &FetchRequest, fetcher: &mut dyn Fetcher) -> Result<(), NetError> {
        fetcher.fetch(request)?;
        self.stats.fetches += 1;
        Ok(())
    }

    fn lookup(&mut self, url: &str) -> Option<CachedResponse> {
        let result = match &mut self.backend {
            Backend::Background(cache) => cache.lookup(url),
            Backend::Memory(memory) => return memory.get(url),
        };
        match result {
            Ok(found) => found,
            Err(e) => {
                self.degrade(e);
                None
            }
        }
    }

    fn store(&mut self, entry: CachedResponse) {
        let result = match &mut self.backend {
            Backend::Background(cache) => cache.store(entry.clone()),
            Backend::Memory(memory) => {
                memory.put(entry);
                self.stats.stores += 1;
                return;
            }
        };
        match result {
            Ok(()) => self.stats.stores += 1,
            Err(e) => {
                self.degrade(e);
                if let Backend::Memory(memory) = &mut self.backend {
                    memory.put(entry);
                    self.stats.stores += 1;
                }
            }
        }
    }

    fn degrade(&mut self, err: CacheError) {
        tracing::warn!("{}; falling back to {}-entry memory cache", err, self.memory_capacity);
        self.faults.push(err);
        self.backend = Backend::Memory(MemoryCache::new(self.memory_capacity));
    }
}
