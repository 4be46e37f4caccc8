use std::collections::VecDeque;

/// Fixed-capacity FIFO log. Pushing onto a full history evicts the oldest
/// entry; entries are never modified in place.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, returning the evicted one if the history was full
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn oldest(&self) -> Option<&T> {
        self.entries.front()
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    /// The newest `n` entries, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_within_capacity() {
        let mut history = BoundedHistory::new(3);
        assert!(history.is_empty());
        assert_eq!(history.push(1), None);
        assert_eq!(history.push(2), None);
        assert_eq!(history.len(), 2);
        assert_eq!(history.latest(), Some(&2));
        assert_eq!(history.oldest(), Some(&1));
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut history = BoundedHistory::new(100);
        for i in 0..150 {
            history.push(i);
        }

        assert_eq!(history.len(), 100);
        assert_eq!(history.oldest(), Some(&50));
        assert_eq!(history.latest(), Some(&149));
        assert!(history.iter().copied().eq(50..150));
    }

    #[test]
    fn test_push_returns_evicted_entry() {
        let mut history = BoundedHistory::new(2);
        history.push("a");
        history.push("b");
        assert_eq!(history.push("c"), Some("a"));
        assert_eq!(history.capacity(), 2);
    }

    #[test]
    fn test_recent() {
        let mut history = BoundedHistory::new(10);
        for i in 0..7 {
            history.push(i);
        }
        assert_eq!(history.recent(3).copied().collect::<Vec<_>>(), vec![4, 5, 6]);
        assert_eq!(history.recent(20).count(), 7);
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let mut history = BoundedHistory::new(0);
        history.push(1);
        history.push(2);
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest(), Some(&2));
    }
}
