//! Resource reference extraction
//!
//! Finds the fetchable reference carried by an element. Resource hints
//! (`preconnect`, `dns-prefetch`, `prefetch`, `preload`) are never
//! treated as resources.

use pageflow_dom::{DomTree, ElementData, HintRel, NodeId};
use pageflow_net::ResourceType;

/// Attributes whose changes can alter an element's reference
pub const WATCHED_ATTRIBUTES: &[&str] = &["src", "data-src", "href", "rel"];

/// Raw reference found in the page
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRef {
    /// As written by the author (relative or absolute)
    pub reference: String,
    pub resource_type: ResourceType,
    pub node: Option<NodeId>,
}

impl ResourceRef {
    pub fn new(reference: &str, resource_type: ResourceType) -> Self {
        Self {
            reference: reference.to_string(),
            resource_type,
            node: None,
        }
    }

    pub fn for_node(reference: &str, resource_type: ResourceType, node: NodeId) -> Self {
        Self {
            reference: reference.to_string(),
            resource_type,
            node: Some(node),
        }
    }
}

/// Reference carried by `node`, if it is a resource element
pub fn extract_reference(tree: &DomTree, node: NodeId) -> Option<ResourceRef> {
    let element = tree.element(node)?;
    let resource_type = ResourceType::from_element(element.tag(), element.get_attribute("rel"))?;
    if element.tag() == "link" && is_hint(element) {
        return None;
    }

    let reference = match resource_type {
        ResourceType::Image | ResourceType::Video => deferred_source(element)?,
        ResourceType::Script => element.get_attribute("src")?,
        ResourceType::Stylesheet => element.get_attribute("href")?,
    };
    Some(ResourceRef::for_node(reference, resource_type, node))
}

/// `data-src` wins over `src` (the latter may hold a placeholder)
fn deferred_source(element: &ElementData) -> Option<&str> {
    element
        .get_attribute("data-src")
        .or_else(|| element.get_attribute("src"))
}

fn is_hint(element: &ElementData) -> bool {
    element
        .get_attribute("rel")
        .is_some_and(|rel| rel.split_ascii_whitespace().any(|t| HintRel::from_token(t).is_some()))
}
