//! pageflow Networking
//!
//! Connection-quality monitoring, the fetcher seam to the host, and the
//! cache coordinator that every load goes through.

pub mod resource_type;
pub mod network;
pub mod fetch;
pub mod memory_cache;
pub mod manifest;
pub mod cache;

pub use resource_type::ResourceType;
pub use network::{ConnectionClass, EffectiveType, NetworkChange, NetworkMonitor, NetworkProfile};
pub use fetch::{Fetcher, FetchMode, FetchRequest, RecordingFetcher};
pub use memory_cache::MemoryCache;
pub use manifest::{ManifestEntry, PolicyManifest};
pub use cache::{
    BackgroundCache, CacheCoordinator, CacheError, CacheOutcome, CachePolicy, CacheStats, CachedResponse,
};

/// Network error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request refused by host: {0}")]
    Refused(String),
}
