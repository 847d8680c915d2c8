//! pageflow DOM - Host page model
//!
//! Arena-based element tree with the pieces the loading engine consumes
//! from a host page: structure, attributes, layout geometry and a
//! structural-change stream.

mod node;
mod tree;
mod document;
pub mod geometry;
pub mod observer;
pub mod edit;

pub use node::{Node, NodeData, ElementData, Attribute};
pub use tree::{DomTree, Descendants};
pub use document::Document;
pub use geometry::DomRect;
pub use observer::{
    Subscribable, SubscriptionToken, Subscriptions, Notification,
    MutationRecord, MutationType, MutationInterest,
};
pub use edit::{PageEdit, ResourceHint, HintRel};

/// Node identifier (index into arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Document root node ID
    pub const ROOT: NodeId = NodeId(0);
    /// Sentinel for "no node"
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Build an ID from a raw arena index
    pub fn from_raw(index: u32) -> Self {
        NodeId(index)
    }

    /// Raw arena index
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self == NodeId::NONE
    }
}

/// Geometry lookup failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),

    #[error("node {0:?} is detached from the document")]
    Detached(NodeId),
}
