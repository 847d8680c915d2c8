//! Edge case tests for pageflow-dom
//!
//! Tree mutation bookkeeping, geometry and page edits.

use pageflow_dom::*;

fn page() -> Document {
    Document::new("https://a.test/", DomRect::from_xywh(0.0, 0.0, 800.0, 600.0))
}

// ============================================================================
// TREE STRUCTURE TESTS
// ============================================================================

#[test]
fn test_append_refuses_cycles() {
    let mut doc = page();
    let body = doc.body();
    let outer = doc.append_element(body, "div", &[], None);
    let inner = doc.append_element(outer, "div", &[], None);

    assert!(!doc.tree_mut().append_child(inner, outer));
    assert!(!doc.tree_mut().append_child(outer, outer));
    assert_eq!(doc.tree().parent(inner), Some(outer));
}

#[test]
fn test_append_moves_existing_child() {
    let mut doc = page();
    let body = doc.body();
    let a = doc.append_element(body, "div", &[], None);
    let b = doc.append_element(body, "div", &[], None);
    let img = doc.append_element(a, "img", &[], None);

    doc.tree_mut().append_child(b, img);
    assert_eq!(doc.tree().children(a).count(), 0);
    assert_eq!(doc.tree().children(b).collect::<Vec<_>>(), vec![img]);
}

#[test]
fn test_remove_unattached_is_noop() {
    let mut doc = page();
    let orphan = doc.tree_mut().create_element("img");
    assert!(!doc.tree_mut().remove(orphan));
    assert!(!doc.tree_mut().remove(NodeId::from_raw(9999)));
}

#[test]
fn test_find_first_skips_detached() {
    let mut doc = page();
    let body = doc.body();
    let first = doc.append_element(body, "video", &[], None);
    let second = doc.append_element(body, "video", &[], None);
    doc.tree_mut().remove(first);

    assert_eq!(doc.tree().find_first("video"), Some(second));
}

// ============================================================================
// MUTATION STREAM TESTS
// ============================================================================

#[test]
fn test_unwatched_attributes_not_reported() {
    let mut doc = page();
    let body = doc.body();
    let img = doc.append_element(body, "img", &[], None);
    let token = doc
        .tree_mut()
        .subscribe(MutationInterest::structure_and(&["src", "data-src"]));

    doc.tree_mut().set_attribute(img, "alt", "logo");
    doc.tree_mut().set_attribute(img, "data-src", "logo.png");

    let notes = doc.tree_mut().take_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].token, token);
    assert_eq!(notes[0].event.attribute_name.as_deref(), Some("data-src"));
    assert_eq!(notes[0].event.old_value, None);
}

#[test]
fn test_unchanged_attribute_not_reported() {
    let mut doc = page();
    let body = doc.body();
    let img = doc.append_element(body, "img", &[("src", "a.png")], None);
    doc.tree_mut().subscribe(MutationInterest::structure_and(&["src"]));

    assert!(doc.tree_mut().set_attribute(img, "src", "a.png"));
    assert!(doc.tree_mut().take_notifications().is_empty());
}

#[test]
fn test_unsubscribe_discards_queued() {
    let mut doc = page();
    let body = doc.body();
    let keep = doc.tree_mut().subscribe(MutationInterest::structure_and(&[]));
    let dropped = doc.tree_mut().subscribe(MutationInterest::structure_and(&[]));

    doc.append_element(body, "script", &[], None);
    assert!(doc.tree_mut().unsubscribe(dropped));
    assert!(!doc.tree_mut().unsubscribe(dropped));

    let notes = doc.tree_mut().take_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].token, keep);
    assert_eq!(notes[0].event.mutation_type, MutationType::ChildList);
}

#[test]
fn test_detached_subtree_changes_silent() {
    let mut doc = page();
    let body = doc.body();
    let section = doc.append_element(body, "section", &[], None);
    let img = doc.append_element(section, "img", &[], None);
    doc.tree_mut().remove(section);
    doc.tree_mut().subscribe(MutationInterest::structure_and(&["src"]));

    doc.tree_mut().set_attribute(img, "src", "late.png");
    doc.tree_mut().create_element("div");
    assert!(doc.tree_mut().take_notifications().is_empty());
}

// ============================================================================
// GEOMETRY TESTS
// ============================================================================

#[test]
fn test_visible_ratio_partial() {
    let viewport = DomRect::from_xywh(0.0, 0.0, 800.0, 600.0);
    let half = DomRect::from_xywh(0.0, 550.0, 100.0, 100.0);
    assert!((half.visible_ratio(&viewport) - 0.5).abs() < 1e-9);

    let outside = DomRect::from_xywh(0.0, 700.0, 100.0, 100.0);
    assert_eq!(outside.visible_ratio(&viewport), 0.0);
    assert!(outside.visible_ratio(&viewport.expand(150.0)) > 0.0);
}

#[test]
fn test_zero_area_visible_only_inside_root() {
    let viewport = DomRect::from_xywh(0.0, 0.0, 800.0, 600.0);
    let inside = DomRect::from_xywh(10.0, 10.0, 0.0, 0.0);
    let below = DomRect::from_xywh(10.0, 900.0, 0.0, 0.0);
    assert_eq!(inside.visible_ratio(&viewport), 1.0);
    assert_eq!(below.visible_ratio(&viewport), 0.0);
}

#[test]
fn test_bounding_rect_errors() {
    let mut doc = page();
    let body = doc.body();
    let text = doc.tree_mut().create_text("hello");
    doc.tree_mut().append_child(body, text);
    let unrendered = doc.append_element(body, "img", &[], None);

    assert_eq!(doc.tree().bounding_rect(text), Err(GeometryError::UnknownNode(text)));
    assert_eq!(doc.tree().bounding_rect(unrendered), Ok(None));
}

// ============================================================================
// PAGE EDIT TESTS
// ============================================================================

#[test]
fn test_edit_on_missing_node_dropped() {
    let mut doc = page();
    let applied = doc.apply_all([
        PageEdit::set(NodeId::from_raw(4242), "src", "x.png"),
        PageEdit::RemoveAttribute {
            node: doc.body(),
            name: "never-set".to_string(),
        },
    ]);
    assert_eq!(applied, 0);
}

#[test]
fn test_hint_insertion_deduplicates() {
    let mut doc = page();
    let hint = ResourceHint::new(HintRel::Preload, "https://a.test/app.js").with_as("script");

    assert!(doc.apply(PageEdit::InsertHint(hint.clone())));
    assert!(doc.apply(PageEdit::InsertHint(hint.clone())));
    assert_eq!(doc.hints(), vec![hint]);
}

#[test]
fn test_edit_target() {
    let node = NodeId::from_raw(7);
    assert_eq!(PageEdit::set(node, "src", "a").target(), Some(node));
    let hint = ResourceHint::new(HintRel::Preconnect, "https://cdn.test");
    assert_eq!(PageEdit::InsertHint(hint).target(), None);
}
