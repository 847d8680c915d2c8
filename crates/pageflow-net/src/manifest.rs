//! Policy manifest
//!
//! The resource list plus cache policy per entry, handed to the background
//! cache so it can apply the same strategies for requests it intercepts.

use serde::{Deserialize, Serialize};

use crate::{CachePolicy, ResourceType};

/// Manifest format version
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub url: String,
    pub resource_type: ResourceType,
    pub policy: CachePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyManifest {
    pub version: u32,
    pub generated_at_ms: f64,
    pub entries: Vec<ManifestEntry>,
}

impl PolicyManifest {
    pub fn new(generated_at_ms: f64) -> Self {
        Self {
            version: MANIFEST_VERSION,
            generated_at_ms,
            entries: Vec::new(),
        }
    }

    /// Add a resource with the policy its type maps to
    pub fn push(&mut self, url: &str, resource_type: ResourceType) {
        self.entries.push(ManifestEntry {
            url: url.to_string(),
            resource_type,
            policy: CachePolicy::for_type(resource_type),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_policies() {
        let mut manifest = PolicyManifest::new(12.5);
        manifest.push("https://a.test/hero.jpg", ResourceType::Image);
        manifest.push("https://a.test/app.js", ResourceType::Script);
        manifest.push("https://a.test/intro.mp4", ResourceType::Video);

        let policies: Vec<_> = manifest.entries.iter().map(|e| e.policy).collect();
        assert_eq!(
            policies,
            vec![CachePolicy::CacheFirst, CachePolicy::StaleWhileRevalidate, CachePolicy::NetworkFirst]
        );
    }

    #[test]
    fn test_manifest_json_shape() {
        let mut manifest = PolicyManifest::new(0.0);
        manifest.push("https://a.test/site.css", ResourceType::Stylesheet);

        let json = manifest.to_json().unwrap();
        assert!(json.contains(r#""resourceType":"stylesheet""#));
        assert!(json.contains(r#""policy":"stale-while-revalidate""#));
        assert_eq!(PolicyManifest::from_json(&json).unwrap(), manifest);
    }
}
