//! Observation
//!
//! Every input source the engine listens to (structural changes,
//! visibility, connection quality, timing alerts) is modelled the same way:
//! a subscriber registers an interest and receives a token, notifications
//! are queued per token and drained by the owner of the token, and
//! unsubscribing drops both the interest and anything still queued for it.

use std::collections::BTreeMap;

use crate::NodeId;

/// Cancellation handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

impl SubscriptionToken {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// One queued event addressed to one subscription
#[derive(Debug, Clone, PartialEq)]
pub struct Notification<E> {
    pub token: SubscriptionToken,
    pub event: E,
}

/// An observable input source
pub trait Subscribable<E> {
    /// What a subscriber asks to be told about
    type Interest;

    /// Register interest; the token is the only way to cancel it
    fn subscribe(&mut self, interest: Self::Interest) -> SubscriptionToken;

    /// Cancel a subscription. Notifications already queued for the token
    /// are discarded. Returns false for unknown or already-cancelled tokens.
    fn unsubscribe(&mut self, token: SubscriptionToken) -> bool;

    /// Drain queued notifications, in emission order
    fn take_notifications(&mut self) -> Vec<Notification<E>>;
}

/// Live subscription table shared by the `Subscribable` implementations
#[derive(Debug, Clone)]
pub struct Subscriptions<I> {
    next_token: u64,
    live: BTreeMap<SubscriptionToken, I>,
}

impl<I> Default for Subscriptions<I> {
    fn default() -> Self {
        Self {
            next_token: 1,
            live: BTreeMap::new(),
        }
    }
}

impl<I> Subscriptions<I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, interest: I) -> SubscriptionToken {
        let token = SubscriptionToken(self.next_token);
        self.next_token += 1;
        self.live.insert(token, interest);
        token
    }

    pub fn remove(&mut self, token: SubscriptionToken) -> Option<I> {
        self.live.remove(&token)
    }

    pub fn get(&self, token: SubscriptionToken) -> Option<&I> {
        self.live.get(&token)
    }

    pub fn contains(&self, token: SubscriptionToken) -> bool {
        self.live.contains_key(&token)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SubscriptionToken, &I)> {
        self.live.iter().map(|(t, i)| (*t, i))
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn clear(&mut self) {
        self.live.clear();
    }
}

/// Mutation type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationType {
    Attributes,
    ChildList,
}

/// Mutation record
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    pub mutation_type: MutationType,
    pub target: NodeId,
    pub added_nodes: Vec<NodeId>,
    pub removed_nodes: Vec<NodeId>,
    pub attribute_name: Option<String>,
    pub old_value: Option<String>,
}

impl MutationRecord {
    pub fn child_added(parent: NodeId, child: NodeId) -> Self {
        Self {
            mutation_type: MutationType::ChildList,
            target: parent,
            added_nodes: vec![child],
            removed_nodes: Vec::new(),
            attribute_name: None,
            old_value: None,
        }
    }

    pub fn child_removed(parent: NodeId, child: NodeId) -> Self {
        Self {
            mutation_type: MutationType::ChildList,
            target: parent,
            added_nodes: Vec::new(),
            removed_nodes: vec![child],
            attribute_name: None,
            old_value: None,
        }
    }

    pub fn attribute(target: NodeId, name: &str, old_value: Option<String>) -> Self {
        Self {
            mutation_type: MutationType::Attributes,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
            attribute_name: Some(name.to_ascii_lowercase()),
            old_value,
        }
    }
}

/// Mutation subscription options (always document-wide)
#[derive(Debug, Clone, Default)]
pub struct MutationInterest {
    pub child_list: bool,
    pub attributes: bool,
    pub attribute_filter: Option<Vec<String>>,
}

impl MutationInterest {
    /// Child-list changes plus the given attributes
    pub fn structure_and(attributes: &[&str]) -> Self {
        Self {
            child_list: true,
            attributes: true,
            attribute_filter: Some(attributes.iter().map(|a| a.to_string()).collect()),
        }
    }

    pub fn matches(&self, record: &MutationRecord) -> bool {
        match record.mutation_type {
            MutationType::ChildList => self.child_list,
            MutationType::Attributes => {
                if !self.attributes {
                    return false;
                }
                match (&self.attribute_filter, &record.attribute_name) {
                    (Some(filter), Some(name)) => filter.iter().any(|f| f.eq_ignore_ascii_case(name)),
                    _ => true,
                }
            }
        }
    }
}
