//! Page edits
//!
//! The engine never touches the host page directly; it emits edits that
//! the host applies (see `Document::apply`).

use crate::NodeId;

/// Resource hint relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HintRel {
    Preconnect,
    DnsPrefetch,
    Prefetch,
    Preload,
}

impl HintRel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preconnect => "preconnect",
            Self::DnsPrefetch => "dns-prefetch",
            Self::Prefetch => "prefetch",
            Self::Preload => "preload",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "preconnect" => Some(Self::Preconnect),
            "dns-prefetch" => Some(Self::DnsPrefetch),
            "prefetch" => Some(Self::Prefetch),
            "preload" => Some(Self::Preload),
            _ => None,
        }
    }
}

/// `<link rel=... href=...>` directive for the page head
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHint {
    pub rel: HintRel,
    pub href: String,
    /// `as` attribute for preload hints
    pub as_type: Option<String>,
}

impl ResourceHint {
    pub fn new(rel: HintRel, href: impl Into<String>) -> Self {
        Self {
            rel,
            href: href.into(),
            as_type: None,
        }
    }

    pub fn with_as(mut self, as_type: &str) -> Self {
        self.as_type = Some(as_type.to_string());
        self
    }
}

/// A single change requested of the host page
#[derive(Debug, Clone, PartialEq)]
pub enum PageEdit {
    /// Rewrite an element attribute (real source or placeholder swap)
    SetAttribute { node: NodeId, name: String, value: String },
    /// Drop an attribute
    RemoveAttribute { node: NodeId, name: String },
    /// Insert a resource hint into the head
    InsertHint(ResourceHint),
}

impl PageEdit {
    pub fn set(node: NodeId, name: &str, value: &str) -> Self {
        Self::SetAttribute {
            node,
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn target(&self) -> Option<NodeId> {
        match self {
            Self::SetAttribute { node, .. } | Self::RemoveAttribute { node, .. } => Some(*node),
            Self::InsertHint(_) => None,
        }
    }
}
