//! Resource records

use pageflow_dom::NodeId;
use pageflow_net::ResourceType;
use serde::Serialize;

/// Dense resource handle, assigned in registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceId(pub(crate) u32);

impl ResourceId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Load priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Deferred until visible
    Lazy = 0,
    /// Below the fold
    Low = 1,
    #[default]
    Medium = 2,
    /// Above the fold or navigation
    High = 3,
    /// Explicitly marked by the author
    Critical = 4,
}

impl Priority {
    /// All levels, highest first
    pub fn all() -> &'static [Priority] {
        &[
            Priority::Critical,
            Priority::High,
            Priority::Medium,
            Priority::Low,
            Priority::Lazy,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Lazy => "lazy",
        }
    }
}

/// Resource lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadState {
    #[default]
    Discovered,
    Queued,
    LazyPending,
    Preloading,
    Prefetching,
    Loading,
    Loaded,
    Cached,
    Failed,
    /// Visibility-triggered image load failed; placeholder kept
    LazyError,
}

impl LoadState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Preloading | Self::Prefetching | Self::Loading)
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Loaded | Self::Cached | Self::Failed | Self::LazyError)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed | Self::LazyError)
    }
}

/// How the last load was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStatus {
    #[default]
    Unknown,
    Miss,
    Hit,
    /// Served stale, refresh issued
    Revalidated,
}

/// Registered resource
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    /// Normalized absolute URL (the identity)
    pub url: String,
    pub resource_type: ResourceType,
    pub priority: Priority,
    pub state: LoadState,
    pub above_fold: bool,
    /// Laid out entirely under the initial viewport
    pub below_fold: bool,
    pub byte_size: Option<u64>,
    pub load_duration_ms: Option<f64>,
    pub cache_status: CacheStatus,
    /// Elements referencing this URL
    pub elements: Vec<NodeId>,
    pub registered_at_ms: f64,
}

impl Resource {
    pub fn new(id: ResourceId, url: String, resource_type: ResourceType, registered_at_ms: f64) -> Self {
        Self {
            id,
            url,
            resource_type,
            priority: Priority::Medium,
            state: LoadState::Discovered,
            above_fold: false,
            below_fold: false,
            byte_size: None,
            load_duration_ms: None,
            cache_status: CacheStatus::Unknown,
            elements: Vec::new(),
            registered_at_ms,
        }
    }

    /// Images under the fold wait for visibility unless explicitly critical
    pub fn defers_to_visibility(&self) -> bool {
        self.priority <= Priority::Low
            || (self.resource_type == ResourceType::Image
                && self.below_fold
                && self.priority < Priority::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::Low > Priority::Lazy);
        let mut sorted = vec![Priority::Low, Priority::Critical, Priority::Medium];
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(sorted, vec![Priority::Critical, Priority::Medium, Priority::Low]);
    }

    #[test]
    fn test_defers_to_visibility() {
        let mut image = Resource::new(ResourceId(0), "https://a.test/a.png".into(), ResourceType::Image, 0.0);
        assert!(!image.defers_to_visibility());

        image.below_fold = true;
        image.priority = Priority::High;
        assert!(image.defers_to_visibility());

        image.priority = Priority::Critical;
        assert!(!image.defers_to_visibility());

        let mut script = Resource::new(ResourceId(1), "https://a.test/a.js".into(), ResourceType::Script, 0.0);
        script.below_fold = true;
        assert!(!script.defers_to_visibility());
        script.priority = Priority::Low;
        assert!(script.defers_to_visibility());
    }
}
