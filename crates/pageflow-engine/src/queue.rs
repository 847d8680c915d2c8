//! Resource queues
//!
//! Priority queue of resource handles. Highest priority first, FIFO by
//! registration order within a priority.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::resource::{Priority, ResourceId};

/// Queued resource handle
#[derive(Debug, Clone, Copy)]
struct QueuedEntry {
    id: ResourceId,
    priority: Priority,
    /// Distinguishes a re-push from a cancelled earlier entry
    generation: u64,
}

impl Eq for QueuedEntry {}

impl PartialEq for QueuedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.generation == other.generation
    }
}

impl Ord for QueuedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first
        match self.priority.cmp(&other.priority) {
            // Earlier registrations first (FIFO within same priority)
            Ordering::Equal => other.id.cmp(&self.id),
            other => other,
        }
    }
}

impl PartialOrd for QueuedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue of resources
#[derive(Debug, Default)]
pub struct ResourceQueue {
    heap: BinaryHeap<QueuedEntry>,
    /// Live entries; heap entries not in here were cancelled
    live: HashMap<ResourceId, (Priority, u64)>,
    next_generation: u64,
}

impl ResourceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue; false if already queued
    pub fn push(&mut self, id: ResourceId, priority: Priority) -> bool {
        if self.live.contains_key(&id) {
            return false;
        }
        let generation = self.next_generation;
        self.next_generation += 1;

        self.live.insert(id, (priority, generation));
        self.heap.push(QueuedEntry { id, priority, generation });
        true
    }

    /// Dequeue the highest-priority live entry
    pub fn pop(&mut self) -> Option<(ResourceId, Priority)> {
        loop {
            let entry = self.heap.pop()?;
            match self.live.get(&entry.id) {
                Some(&(_, generation)) if generation == entry.generation => {
                    self.live.remove(&entry.id);
                    return Some((entry.id, entry.priority));
                }
                // Cancelled or superseded
                _ => continue,
            }
        }
    }

    /// Cancel a queued entry
    pub fn cancel(&mut self, id: ResourceId) -> bool {
        let removed = self.live.remove(&id).is_some();
        self.compact();
        removed
    }

    /// Remove and return live entries matching `predicate`, in queue order
    pub fn drain_where(&mut self, predicate: impl Fn(Priority) -> bool) -> Vec<(ResourceId, Priority)> {
        let drained: Vec<_> = self
            .entries()
            .into_iter()
            .filter(|&(_, priority)| predicate(priority))
            .collect();
        for (id, _) in &drained {
            self.live.remove(id);
        }
        self.compact();
        drained
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Live entries in dequeue order
    pub fn entries(&self) -> Vec<(ResourceId, Priority)> {
        let mut entries: Vec<QueuedEntry> = self
            .live
            .iter()
            .map(|(&id, &(priority, generation))| QueuedEntry { id, priority, generation })
            .collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.into_iter().map(|e| (e.id, e.priority)).collect()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }

    /// Drop cancelled heap entries once they dominate the heap
    fn compact(&mut self) {
        if self.heap.len() > 32 && self.heap.len() > self.live.len() * 2 {
            let live = &self.live;
            self.heap
                .retain(|e| live.get(&e.id).is_some_and(|&(_, generation)| generation == e.generation));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> ResourceId {
        ResourceId(raw)
    }

    #[test]
    fn test_priority_then_fifo() {
        let mut queue = ResourceQueue::new();
        queue.push(id(3), Priority::Medium);
        queue.push(id(1), Priority::Medium);
        queue.push(id(2), Priority::Critical);

        assert_eq!(queue.pop(), Some((id(2), Priority::Critical)));
        assert_eq!(queue.pop(), Some((id(1), Priority::Medium)));
        assert_eq!(queue.pop(), Some((id(3), Priority::Medium)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_cancel_and_repush() {
        let mut queue = ResourceQueue::new();
        queue.push(id(1), Priority::High);
        assert!(!queue.push(id(1), Priority::High));

        assert!(queue.cancel(id(1)));
        assert!(queue.is_empty());
        assert!(queue.push(id(1), Priority::Low));

        // The cancelled High entry must not resurface
        assert_eq!(queue.pop(), Some((id(1), Priority::Low)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_drain_where_keeps_order() {
        let mut queue = ResourceQueue::new();
        queue.push(id(0), Priority::Critical);
        queue.push(id(1), Priority::Medium);
        queue.push(id(2), Priority::High);
        queue.push(id(3), Priority::Medium);

        let drained = queue.drain_where(|p| p < Priority::High);
        assert_eq!(drained, vec![(id(1), Priority::Medium), (id(3), Priority::Medium)]);
        assert_eq!(queue.entries(), vec![(id(0), Priority::Critical), (id(2), Priority::High)]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_compaction_preserves_live_entries() {
        let mut queue = ResourceQueue::new();
        for raw in 0..100 {
            queue.push(id(raw), Priority::Medium);
        }
        for raw in 0..90 {
            queue.cancel(id(raw));
        }
        assert_eq!(queue.len(), 10);
        assert!(queue.heap.len() <= 32);
        let popped: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|(id, _)| id.raw()).collect();
        assert_eq!(popped, (90..100).collect::<Vec<_>>());
    }
}
