//! Resource types
//!
//! The four fetchable asset kinds the engine schedules.

use serde::{Deserialize, Serialize};

/// Resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Image,
    Script,
    Stylesheet,
    Video,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Script => "script",
            Self::Stylesheet => "stylesheet",
            Self::Video => "video",
        }
    }

    /// Value for the `as` attribute of a preload hint
    pub fn preload_as(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Script => "script",
            Self::Stylesheet => "style",
            Self::Video => "video",
        }
    }

    /// Kind of resource an element references, if any.
    ///
    /// `rel` is only consulted for `link`; hint links (`preload`,
    /// `prefetch`, ...) are not resources in their own right.
    pub fn from_element(tag: &str, rel: Option<&str>) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "img" => Some(Self::Image),
            "script" => Some(Self::Script),
            "video" => Some(Self::Video),
            "link" => {
                let is_stylesheet = rel
                    .map(|r| r.split_ascii_whitespace().any(|t| t.eq_ignore_ascii_case("stylesheet")))
                    .unwrap_or(false);
                is_stylesheet.then_some(Self::Stylesheet)
            }
            _ => None,
        }
    }

    /// Detect resource type from URL and content-type
    pub fn from_hints(url: &str, content_type: Option<&str>) -> Option<Self> {
        // Check content-type first
        if let Some(ct) = content_type {
            let ct_lower = ct.to_lowercase();
            if ct_lower.contains("text/css") {
                return Some(Self::Stylesheet);
            }
            if ct_lower.contains("javascript") {
                return Some(Self::Script);
            }
            if ct_lower.starts_with("image/") {
                return Some(Self::Image);
            }
            if ct_lower.starts_with("video/") {
                return Some(Self::Video);
            }
        }

        // Check URL extension
        let url_lower = url.to_lowercase();
        let path = url_lower.split(['?', '#']).next().unwrap_or("");
        let ext = path.rsplit('.').next().unwrap_or("");

        match ext {
            "css" => Some(Self::Stylesheet),
            "js" | "mjs" => Some(Self::Script),
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "avif" | "svg" | "ico" => Some(Self::Image),
            "mp4" | "webm" | "ogv" | "mov" => Some(Self::Video),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
