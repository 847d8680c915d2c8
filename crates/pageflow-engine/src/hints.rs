//! Resource hints for the page head

use std::collections::HashSet;

use pageflow_dom::{DomTree, HintRel, NodeId, ResourceHint};
use url::Url;

/// `preconnect` for every distinct cross-origin host, in first-seen order
pub fn preconnect_hints<'a>(page: &Url, urls: impl IntoIterator<Item = &'a str>) -> Vec<ResourceHint> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter_map(|u| Url::parse(u).ok())
        .filter(|u| u.origin() != page.origin())
        .map(|u| u.origin().ascii_serialization())
        .filter(|origin| seen.insert(origin.clone()))
        .map(|origin| ResourceHint::new(HintRel::Preconnect, origin))
        .collect()
}

/// `prefetch` hints for up to `limit` distinct same-origin pages linked from the document
pub fn speculative_prefetch(tree: &DomTree, page: &Url, limit: usize) -> Vec<ResourceHint> {
    let mut seen = HashSet::new();
    let mut current = page.clone();
    current.set_fragment(None);

    let mut hints = Vec::new();
    for node in tree.descendants(NodeId::ROOT) {
        if hints.len() >= limit {
            break;
        }
        let Some(href) = tree
            .element(node)
            .filter(|e| e.tag() == "a")
            .and_then(|e| e.get_attribute("href"))
        else {
            continue;
        };
        let Ok(mut target) = page.join(href.trim()) else {
            continue;
        };
        target.set_fragment(None);
        if target.origin() != page.origin() || target == current {
            continue;
        }
        if seen.insert(target.to_string()) {
            hints.push(ResourceHint::new(HintRel::Prefetch, target.to_string()).with_as("document"));
        }
    }
    hints
}
