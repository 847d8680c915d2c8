//! Capped alert log

use std::collections::VecDeque;

/// Ring buffer keeping the most recent `capacity` entries
#[derive(Debug, Clone)]
pub struct AlertLog<T> {
    capacity: usize,
    entries: VecDeque<T>,
    total: u64,
}

impl<T: Clone> AlertLog<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            total: 0,
        }
    }

    /// Append, dropping the oldest entry when full
    pub fn push(&mut self, entry: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.total += 1;
    }

    /// Retained entries, oldest first
    pub fn entries(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ever pushed, including dropped ones
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_keeps_latest() {
        let mut log = AlertLog::new(3);
        for i in 0..5 {
            log.push(i);
        }
        assert_eq!(log.entries(), vec![2, 3, 4]);
        assert_eq!(log.total(), 5);
        assert_eq!(log.latest(), Some(&4));
    }
}
