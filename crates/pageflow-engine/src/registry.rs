//! Resource Registry
//!
//! Single source of truth for every resource the page references,
//! deduplicated by normalized URL.

use std::collections::{BTreeMap, HashMap};

use pageflow_dom::NodeId;
use url::Url;

use crate::discovery::ResourceRef;
use crate::error::DiscoveryError;
use crate::resource::{Priority, Resource, ResourceId};

/// Priority decision made at registration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Classification {
    pub priority: Priority,
    pub above_fold: bool,
    pub below_fold: bool,
}

impl Classification {
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }
}

/// Registration outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    New(ResourceId),
    /// URL already tracked; the element (if any) was attached to it
    Existing(ResourceId),
}

impl Registered {
    pub fn id(self) -> ResourceId {
        match self {
            Registered::New(id) | Registered::Existing(id) => id,
        }
    }

    pub fn is_new(self) -> bool {
        matches!(self, Registered::New(_))
    }
}

/// Outcome of detaching an element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detached {
    /// Other elements still reference the resource
    Retained(ResourceId),
    /// Last element gone, resource unregistered
    Removed(ResourceId),
}

#[derive(Debug, Default)]
pub struct Registry {
    base: Option<Url>,
    resources: BTreeMap<ResourceId, Resource>,
    by_url: HashMap<String, ResourceId>,
    by_node: HashMap<NodeId, ResourceId>,
    next_id: u32,
    /// Bumped on every add/remove
    revision: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry resolving relative references against `document_url`
    pub fn with_base(document_url: &str) -> Result<Self, DiscoveryError> {
        let mut registry = Self::new();
        registry.set_base(document_url)?;
        Ok(registry)
    }

    pub fn set_base(&mut self, document_url: &str) -> Result<(), DiscoveryError> {
        let base = Url::parse(document_url).map_err(|_| DiscoveryError::InvalidBase(document_url.to_string()))?;
        self.base = Some(base);
        Ok(())
    }

    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    /// Resolve and normalize a reference: absolute, fragment removed, http(s) only
    pub fn normalize(&self, reference: &str) -> Result<Url, DiscoveryError> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(DiscoveryError::Empty);
        }

        let parsed = match &self.base {
            Some(base) => base.join(trimmed),
            None => Url::parse(trimmed),
        };
        let mut url = parsed.map_err(|e| DiscoveryError::Malformed {
            reference: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(DiscoveryError::Unfetchable {
                    reference: trimmed.to_string(),
                    scheme: scheme.to_string(),
                });
            }
        }
        url.set_fragment(None);
        Ok(url)
    }

    /// Track a reference. `classify` only runs for URLs seen the first time.
    pub fn register<F>(&mut self, reference: ResourceRef, now_ms: f64, classify: F) -> Result<Registered, DiscoveryError>
    where
        F: FnOnce() -> Classification,
    {
        let url = String::from(self.normalize(&reference.reference)?);

        if let Some(&id) = self.by_url.get(&url) {
            if let Some(node) = reference.node {
                self.attach(id, node);
            }
            return Ok(Registered::Existing(id));
        }

        let id = ResourceId(self.next_id);
        self.next_id += 1;

        let classification = classify();
        let mut resource = Resource::new(id, url.clone(), reference.resource_type, now_ms);
        resource.priority = classification.priority;
        resource.above_fold = classification.above_fold;
        resource.below_fold = classification.below_fold;

        tracing::debug!(
            "Registered {} {} ({}) as {}",
            id,
            url,
            reference.resource_type,
            classification.priority.as_str()
        );

        self.resources.insert(id, resource);
        self.by_url.insert(url, id);
        if let Some(node) = reference.node {
            self.attach(id, node);
        }
        self.revision += 1;
        Ok(Registered::New(id))
    }

    /// Remove a resource and every element mapping to it
    pub fn unregister(&mut self, id: ResourceId) -> Option<Resource> {
        let resource = self.resources.remove(&id)?;
        self.by_url.remove(&resource.url);
        for node in &resource.elements {
            self.by_node.remove(node);
        }
        self.revision += 1;
        tracing::debug!("Unregistered {} {}", id, resource.url);
        Some(resource)
    }

    /// Drop `node` from its resource; unregisters the resource when it was the last
    pub fn detach(&mut self, node: NodeId) -> Option<Detached> {
        let id = self.by_node.remove(&node)?;
        let resource = self.resources.get_mut(&id)?;
        resource.elements.retain(|&n| n != node);
        if resource.elements.is_empty() {
            self.unregister(id);
            Some(Detached::Removed(id))
        } else {
            Some(Detached::Retained(id))
        }
    }

    fn attach(&mut self, id: ResourceId, node: NodeId) {
        if let Some(resource) = self.resources.get_mut(&id) {
            if !resource.elements.contains(&node) {
                resource.elements.push(node);
            }
            self.by_node.insert(node, id);
        }
    }

    pub fn get(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ResourceId) -> Option<&mut Resource> {
        self.resources.get_mut(&id)
    }

    /// Lookup by URL (normalized form or a reference that normalizes to it)
    pub fn find_url(&self, url: &str) -> Option<ResourceId> {
        if let Some(&id) = self.by_url.get(url) {
            return Some(id);
        }
        let normalized = self.normalize(url).ok()?;
        self.by_url.get(normalized.as_str()).copied()
    }

    pub fn find_node(&self, node: NodeId) -> Option<ResourceId> {
        self.by_node.get(&node).copied()
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.resources.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Owned copy of every tracked resource
    pub fn snapshot(&self) -> Vec<Resource> {
        self.resources.values().cloned().collect()
    }

    /// Changes whenever resources are added or removed
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Forget everything; returns the removed IDs
    pub fn clear(&mut self) -> Vec<ResourceId> {
        let ids: Vec<_> = self.resources.keys().copied().collect();
        self.resources.clear();
        self.by_url.clear();
        self.by_node.clear();
        if !ids.is_empty() {
            self.revision += 1;
        }
        ids
    }
}
