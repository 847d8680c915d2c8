//! Document - tree plus page-level state

use crate::edit::{HintRel, PageEdit, ResourceHint};
use crate::{DomRect, DomTree, NodeId};

/// A host page: URL, element tree and the current viewport
#[derive(Debug)]
pub struct Document {
    url: String,
    tree: DomTree,
    head: NodeId,
    body: NodeId,
    viewport: DomRect,
}

impl Document {
    /// Create `<html><head/><body/></html>` for `url`
    pub fn new(url: &str, viewport: DomRect) -> Self {
        let mut tree = DomTree::new();
        let html = tree.create_element("html");
        let head = tree.create_element("head");
        let body = tree.create_element("body");
        tree.append_child(NodeId::ROOT, html);
        tree.append_child(html, head);
        tree.append_child(html, body);

        Self {
            url: url.to_string(),
            tree,
            head,
            body,
            viewport,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn tree(&self) -> &DomTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut DomTree {
        &mut self.tree
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Current viewport in document coordinates
    pub fn viewport(&self) -> DomRect {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: DomRect) {
        self.viewport = viewport;
    }

    /// Scroll vertically to `y`
    pub fn scroll_to(&mut self, y: f64) {
        self.viewport.y = y;
    }

    /// Create an element with attributes and a layout box, appended to `parent`
    pub fn append_element(
        &mut self,
        parent: NodeId,
        tag: &str,
        attrs: &[(&str, &str)],
        layout: Option<DomRect>,
    ) -> NodeId {
        let node = self.tree.create_element(tag);
        for (name, value) in attrs {
            self.tree.set_attribute(node, name, value);
        }
        self.tree.set_layout(node, layout);
        self.tree.append_child(parent, node);
        node
    }

    /// Apply one edit; returns false if its target no longer exists
    pub fn apply(&mut self, edit: PageEdit) -> bool {
        match edit {
            PageEdit::SetAttribute { node, name, value } => {
                let applied = self.tree.set_attribute(node, &name, &value);
                if !applied {
                    tracing::debug!("Dropped edit for missing element {:?}", node);
                }
                applied
            }
            PageEdit::RemoveAttribute { node, name } => self.tree.remove_attribute(node, &name).is_some(),
            PageEdit::InsertHint(hint) => {
                if self.hints().contains(&hint) {
                    return true;
                }
                let mut attrs = vec![("rel", hint.rel.as_str()), ("href", hint.href.as_str())];
                if let Some(as_type) = hint.as_type.as_deref() {
                    attrs.push(("as", as_type));
                }
                let head = self.head;
                self.append_element(head, "link", &attrs, None);
                true
            }
        }
    }

    pub fn apply_all(&mut self, edits: impl IntoIterator<Item = PageEdit>) -> usize {
        let mut applied = 0;
        for edit in edits {
            if self.apply(edit) {
                applied += 1;
            }
        }
        applied
    }

    /// Resource hints currently present in the head
    pub fn hints(&self) -> Vec<ResourceHint> {
        self.tree
            .children(self.head)
            .filter_map(|id| self.tree.element(id))
            .filter(|e| e.tag() == "link")
            .filter_map(|e| {
                let rel = e
                    .get_attribute("rel")?
                    .split_ascii_whitespace()
                    .find_map(HintRel::from_token)?;
                Some(ResourceHint {
                    rel,
                    href: e.get_attribute("href")?.to_string(),
                    as_type: e.get_attribute("as").map(str::to_string),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_skeleton() {
        let doc = Document::new("https://example.com/", DomRect::from_xywh(0.0, 0.0, 1280.0, 720.0));
        assert_eq!(doc.tree().find_first("head"), Some(doc.head()));
        assert_eq!(doc.tree().find_first("body"), Some(doc.body()));
        assert!(doc.hints().is_empty());
    }

    #[test]
    fn test_apply_edits() {
        let mut doc = Document::new("https://example.com/", DomRect::from_xywh(0.0, 0.0, 1280.0, 720.0));
        let body = doc.body();
        let img = doc.append_element(body, "img", &[("data-src", "/hero.jpg")], None);

        assert!(doc.apply(PageEdit::set(img, "src", "/hero.jpg")));
        assert_eq!(doc.tree().element(img).unwrap().get_attribute("src"), Some("/hero.jpg"));

        let hint = ResourceHint::new(HintRel::Preconnect, "https://cdn.example.net");
        doc.apply(PageEdit::InsertHint(hint.clone()));
        doc.apply(PageEdit::InsertHint(hint.clone()));
        assert_eq!(doc.hints(), vec![hint]);
    }
}
