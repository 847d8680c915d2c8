//! DOM Tree (arena-based allocation)
//!
//! Structural edits made through the tree are recorded and delivered to
//! mutation subscribers; only edits under the connected document are
//! reported, matching what a document-wide observer would see.

use crate::observer::{MutationInterest, MutationRecord, Notification, Subscribable, SubscriptionToken, Subscriptions};
use crate::{DomRect, ElementData, GeometryError, Node, NodeId};

/// Arena-based DOM tree
#[derive(Debug)]
pub struct DomTree {
    nodes: Vec<Node>,
    observers: Subscriptions<MutationInterest>,
    pending: Vec<Notification<MutationRecord>>,
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DomTree {
    /// Create a tree holding only the document node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::document()],
            observers: Subscriptions::new(),
            pending: Vec::new(),
        }
    }

    /// Get a node by ID
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Element data for `id`, if it is an element
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.get(id).and_then(Node::as_element)
    }

    /// Number of nodes in the arena (attached or not)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(Node::element(tag))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, content: &str) -> NodeId {
        self.push(Node::text(content.to_string()))
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Append `child` as last child of `parent`, moving it if already attached
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if parent == child || self.get(parent).is_none() || self.get(child).is_none() {
            return false;
        }
        // Refuse to create a cycle
        if self.ancestors(parent).any(|a| a == child) {
            return false;
        }

        self.remove(child);

        let last = self.nodes[parent.index()].last_child;
        {
            let node = &mut self.nodes[child.index()];
            node.parent = parent;
            node.prev_sibling = last;
            node.next_sibling = NodeId::NONE;
        }
        if last.is_none() {
            self.nodes[parent.index()].first_child = child;
        } else {
            self.nodes[last.index()].next_sibling = child;
        }
        self.nodes[parent.index()].last_child = child;

        if self.is_connected(parent) {
            self.record(MutationRecord::child_added(parent, child));
        }
        true
    }

    /// Detach `node` (and its subtree) from its parent
    pub fn remove(&mut self, node: NodeId) -> bool {
        let Some(n) = self.get(node) else {
            return false;
        };
        let (parent, prev, next) = (n.parent, n.prev_sibling, n.next_sibling);
        if parent.is_none() {
            return false;
        }
        let was_connected = self.is_connected(parent);

        if prev.is_none() {
            self.nodes[parent.index()].first_child = next;
        } else {
            self.nodes[prev.index()].next_sibling = next;
        }
        if next.is_none() {
            self.nodes[parent.index()].last_child = prev;
        } else {
            self.nodes[next.index()].prev_sibling = prev;
        }

        let n = &mut self.nodes[node.index()];
        n.parent = NodeId::NONE;
        n.prev_sibling = NodeId::NONE;
        n.next_sibling = NodeId::NONE;

        if was_connected {
            self.record(MutationRecord::child_removed(parent, node));
        }
        true
    }

    /// Set an attribute; reports a mutation when the value changed
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> bool {
        let Some(element) = self.nodes.get_mut(node.index()).and_then(Node::as_element_mut) else {
            return false;
        };
        let old = element.set_attribute(name, value);
        if old.as_deref() == Some(value) {
            return true;
        }
        if self.is_connected(node) {
            self.record(MutationRecord::attribute(node, name, old));
        }
        true
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Option<String> {
        let old = self.nodes.get_mut(node.index()).and_then(Node::as_element_mut)?.remove_attribute(name)?;
        if self.is_connected(node) {
            self.record(MutationRecord::attribute(node, name, Some(old.clone())));
        }
        Some(old)
    }

    /// Set the layout box reported by the host's layout pass
    pub fn set_layout(&mut self, node: NodeId, rect: Option<DomRect>) {
        if let Some(element) = self.nodes.get_mut(node.index()).and_then(Node::as_element_mut) {
            element.layout = rect;
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.get(node).map(|n| n.parent).filter(|p| !p.is_none())
    }

    /// Iterate over ancestors, nearest first
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), move |&id| self.parent(id))
    }

    /// Direct children in order
    pub fn children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let first = self.get(node).map(|n| n.first_child).unwrap_or(NodeId::NONE);
        std::iter::successors(Some(first).filter(|id| !id.is_none()), move |&id| {
            self.get(id).map(|n| n.next_sibling).filter(|s| !s.is_none())
        })
    }

    /// Pre-order walk of `root` and everything below it
    pub fn descendants(&self, root: NodeId) -> Descendants<'_> {
        Descendants {
            tree: self,
            root,
            next: if self.get(root).is_some() { root } else { NodeId::NONE },
        }
    }

    /// Whether the node is reachable from the document root
    pub fn is_connected(&self, node: NodeId) -> bool {
        if node == NodeId::ROOT {
            return true;
        }
        self.get(node).is_some() && self.ancestors(node).any(|a| a == NodeId::ROOT)
    }

    /// Layout box of a connected element (Ok(None) = not rendered)
    pub fn bounding_rect(&self, node: NodeId) -> Result<Option<DomRect>, GeometryError> {
        let element = self.element(node).ok_or(GeometryError::UnknownNode(node))?;
        if !self.is_connected(node) {
            return Err(GeometryError::Detached(node));
        }
        Ok(element.layout)
    }

    /// First connected element with the given tag, in document order
    pub fn find_first(&self, tag: &str) -> Option<NodeId> {
        self.descendants(NodeId::ROOT)
            .find(|&id| self.element(id).is_some_and(|e| e.tag().eq_ignore_ascii_case(tag)))
    }

    fn record(&mut self, record: MutationRecord) {
        for (token, interest) in self.observers.iter() {
            if interest.matches(&record) {
                self.pending.push(Notification { token, event: record.clone() });
            }
        }
    }
}

impl Subscribable<MutationRecord> for DomTree {
    type Interest = MutationInterest;

    fn subscribe(&mut self, interest: MutationInterest) -> SubscriptionToken {
        self.observers.insert(interest)
    }

    fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.pending.retain(|n| n.token != token);
        self.observers.remove(token).is_some()
    }

    fn take_notifications(&mut self) -> Vec<Notification<MutationRecord>> {
        std::mem::take(&mut self.pending)
    }
}

/// Pre-order iterator over a subtree
pub struct Descendants<'a> {
    tree: &'a DomTree,
    root: NodeId,
    next: NodeId,
}

impl Descendants<'_> {
    fn following(&self, mut id: NodeId) -> NodeId {
        loop {
            if id == self.root {
                return NodeId::NONE;
            }
            let Some(node) = self.tree.get(id) else {
                return NodeId::NONE;
            };
            if !node.next_sibling.is_none() {
                return node.next_sibling;
            }
            id = node.parent;
            if id.is_none() {
                return NodeId::NONE;
            }
        }
    }
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next;
        if current.is_none() {
            return None;
        }
        let node = self.tree.get(current)?;
        self.next = if node.first_child.is_none() {
            self.following(current)
        } else {
            node.first_child
        };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MutationType;

    fn sample() -> (DomTree, NodeId, NodeId, NodeId) {
        let mut tree = DomTree::new();
        let html = tree.create_element("html");
        let body = tree.create_element("body");
        let img = tree.create_element("img");
        tree.append_child(NodeId::ROOT, html);
        tree.append_child(html, body);
        tree.append_child(body, img);
        (tree, html, body, img)
    }

    #[test]
    fn test_descendants_preorder() {
        let (mut tree, html, body, img) = sample();
        let p = tree.create_element("p");
        tree.append_child(html, p);

        let order: Vec<_> = tree.descendants(NodeId::ROOT).collect();
        assert_eq!(order, vec![NodeId::ROOT, html, body, img, p]);

        let sub: Vec<_> = tree.descendants(body).collect();
        assert_eq!(sub, vec![body, img]);
    }

    #[test]
    fn test_remove_disconnects_subtree() {
        let (mut tree, _html, body, img) = sample();
        assert!(tree.is_connected(img));

        assert!(tree.remove(body));
        assert!(!tree.is_connected(img));
        assert_eq!(tree.bounding_rect(img), Err(GeometryError::Detached(img)));
        assert_eq!(tree.parent(img), Some(body));
    }

    #[test]
    fn test_mutation_notifications() {
        let (mut tree, _html, body, img) = sample();
        let token = tree.subscribe(MutationInterest::structure_and(&["src"]));

        let video = tree.create_element("video");
        tree.set_attribute(video, "src", "clip.mp4"); // detached: not reported
        tree.append_child(body, video);
        tree.set_attribute(img, "src", "a.png");
        tree.set_attribute(img, "alt", "ignored");
        tree.remove(img);

        let notes = tree.take_notifications();
        assert_eq!(notes.len(), 3);
        assert!(notes.iter().all(|n| n.token == token));
        assert_eq!(notes[0].event.added_nodes, vec![video]);
        assert_eq!(notes[1].event.mutation_type, MutationType::Attributes);
        assert_eq!(notes[2].event.removed_nodes, vec![img]);
    }

    #[test]
    fn test_unsubscribe_drops_queued_records() {
        let (mut tree, _html, body, _img) = sample();
        let token = tree.subscribe(MutationInterest::structure_and(&[]));
        let div = tree.create_element("div");
        tree.append_child(body, div);

        assert!(tree.unsubscribe(token));
        assert!(tree.take_notifications().is_empty());
        assert!(!tree.unsubscribe(token));
    }

    #[test]
    fn test_append_rejects_cycles() {
        let (mut tree, html, body, _img) = sample();
        assert!(!tree.append_child(body, html));
        assert!(tree.is_connected(body));
    }
}
