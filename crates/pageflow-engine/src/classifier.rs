//! Priority Classifier
//!
//! Rule cascade, first match wins:
//! 1. `data-critical` or `fetchpriority="high"` → Critical
//! 2. top edge above the initial fold → High
//! 3. inside `nav`/`header` or a navigation/banner landmark → High
//! 4. `loading="lazy"`, `data-lazy` or a below-fold image → Lazy
//! 5. below the fold → Low
//! 6. otherwise → Medium
//!
//! Elements without a layout box skip the geometric rules.

use pageflow_dom::{DomTree, ElementData, NodeId};
use pageflow_net::ResourceType;

use crate::error::ClassificationError;
use crate::registry::Classification;
use crate::resource::Priority;

/// Classify the element backing a resource
///
/// `fold_line` is the bottom edge of the initial viewport.
pub fn classify(
    tree: &DomTree,
    node: NodeId,
    resource_type: ResourceType,
    fold_line: f64,
) -> Result<Classification, ClassificationError> {
    let rect = tree.bounding_rect(node)?;
    let element = tree.element(node).ok_or(ClassificationError::UnknownNode(node))?;

    let above_fold = rect.is_some_and(|r| r.top() < fold_line);
    let below_fold = rect.is_some_and(|r| r.top() >= fold_line);
    let classification = |priority| Classification {
        priority,
        above_fold,
        below_fold,
    };

    if is_marked_critical(element) {
        return Ok(classification(Priority::Critical));
    }
    if above_fold {
        return Ok(classification(Priority::High));
    }
    if in_navigation(tree, node) {
        return Ok(classification(Priority::High));
    }
    if is_marked_lazy(element) || (below_fold && resource_type == ResourceType::Image) {
        return Ok(classification(Priority::Lazy));
    }
    if below_fold {
        return Ok(classification(Priority::Low));
    }
    Ok(classification(Priority::Medium))
}

/// Classify, falling back to Medium when geometry is unavailable
pub fn classify_or_default(
    tree: &DomTree,
    node: NodeId,
    resource_type: ResourceType,
    fold_line: f64,
) -> (Classification, Option<ClassificationError>) {
    match classify(tree, node, resource_type, fold_line) {
        Ok(classification) => (classification, None),
        Err(err) => {
            tracing::warn!("Classification failed, defaulting to medium: {}", err);
            (Classification::new(Priority::Medium), Some(err))
        }
    }
}

fn is_marked_critical(element: &ElementData) -> bool {
    element.has_attribute("data-critical")
        || element
            .get_attribute("fetchpriority")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("high"))
}

fn is_marked_lazy(element: &ElementData) -> bool {
    element.has_attribute("data-lazy")
        || element
            .get_attribute("loading")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("lazy"))
}

fn in_navigation(tree: &DomTree, node: NodeId) -> bool {
    tree.ancestors(node).filter_map(|id| tree.element(id)).any(|e| {
        matches!(e.tag(), "nav" | "header")
            || e.has_token("role", "navigation")
            || e.has_token("role", "banner")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageflow_dom::{Document, DomRect};

    const FOLD: f64 = 600.0;

    fn doc() -> Document {
        Document::new("https://a.test/", DomRect::from_xywh(0.0, 0.0, 800.0, FOLD))
    }

    fn at(y: f64) -> Option<DomRect> {
        Some(DomRect::from_xywh(0.0, y, 100.0, 100.0))
    }

    fn priority(doc: &Document, node: NodeId, resource_type: ResourceType) -> Priority {
        classify(doc.tree(), node, resource_type, FOLD).unwrap().priority
    }

    #[test]
    fn test_critical_marker_wins() {
        let mut doc = doc();
        let body = doc.body();
        let a = doc.append_element(body, "img", &[("src", "a.png"), ("data-critical", "")], at(2000.0));
        let b = doc.append_element(body, "script", &[("src", "a.js"), ("fetchpriority", "HIGH")], None);
        let c = doc.append_element(body, "img", &[("src", "c.png"), ("fetchpriority", "low")], at(2000.0));

        assert_eq!(priority(&doc, a, ResourceType::Image), Priority::Critical);
        assert_eq!(priority(&doc, b, ResourceType::Script), Priority::Critical);
        assert_eq!(priority(&doc, c, ResourceType::Image), Priority::Lazy);
    }

    #[test]
    fn test_fold_rules() {
        let mut doc = doc();
        let body = doc.body();
        let hero = doc.append_element(body, "img", &[("src", "hero.png")], at(100.0));
        let straddle = doc.append_element(body, "img", &[("src", "s.png")], at(550.0));
        let low_img = doc.append_element(body, "img", &[("src", "low.png")], at(900.0));
        let low_script = doc.append_element(body, "script", &[("src", "low.js")], at(900.0));
        let unrendered = doc.append_element(body, "script", &[("src", "x.js")], None);

        let c = classify(doc.tree(), hero, ResourceType::Image, FOLD).unwrap();
        assert_eq!(c.priority, Priority::High);
        assert!(c.above_fold);

        assert_eq!(priority(&doc, straddle, ResourceType::Image), Priority::High);
        assert_eq!(priority(&doc, low_img, ResourceType::Image), Priority::Lazy);
        assert_eq!(priority(&doc, low_script, ResourceType::Script), Priority::Low);

        let c = classify(doc.tree(), unrendered, ResourceType::Script, FOLD).unwrap();
        assert_eq!(c.priority, Priority::Medium);
        assert!(!c.above_fold && !c.below_fold);
    }

    #[test]
    fn test_navigation_ancestors() {
        let mut doc = doc();
        let body = doc.body();
        let nav = doc.append_element(body, "div", &[("role", "navigation")], at(1000.0));
        let logo = doc.append_element(nav, "img", &[("src", "logo.png")], at(1000.0));
        let header = doc.append_element(body, "header", &[], None);
        let icon = doc.append_element(header, "img", &[("src", "icon.png"), ("loading", "lazy")], None);

        assert_eq!(priority(&doc, logo, ResourceType::Image), Priority::High);
        assert_eq!(priority(&doc, icon, ResourceType::Image), Priority::High);
    }

    #[test]
    fn test_lazy_markers() {
        let mut doc = doc();
        let body = doc.body();
        let a = doc.append_element(body, "img", &[("src", "a.png"), ("loading", "lazy")], None);
        let b = doc.append_element(body, "video", &[("data-src", "b.mp4"), ("data-lazy", "")], None);

        assert_eq!(priority(&doc, a, ResourceType::Image), Priority::Lazy);
        assert_eq!(priority(&doc, b, ResourceType::Video), Priority::Lazy);
    }

    #[test]
    fn test_detached_defaults_to_medium() {
        let mut doc = doc();
        let body = doc.body();
        let img = doc.append_element(body, "img", &[("src", "a.png"), ("data-critical", "")], at(0.0));
        doc.tree_mut().remove(img);

        let (classification, err) = classify_or_default(doc.tree(), img, ResourceType::Image, FOLD);
        assert_eq!(classification.priority, Priority::Medium);
        assert_eq!(err, Some(ClassificationError::Detached(img)));
    }
}
