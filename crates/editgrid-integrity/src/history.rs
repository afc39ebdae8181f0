//! Bounded rolling history

use std::collections::VecDeque;

/// FIFO history keeping at most `depth + 1` entries (the last `depth` plus the newest)
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    /// History retaining `depth` previous entries besides the newest
    #[must_use]
    pub fn new(depth: usize) -> Self {
        let capacity = depth + 1;
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest entries beyond capacity
    pub fn push(&mut self, entry: T) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Remove and return the first entry matching `pred`
    pub fn take_where<F>(&mut self, pred: F) -> Option<T>
    where
        F: Fn(&T) -> bool,
    {
        let pos = self.entries.iter().position(pred)?;
        self.entries.remove(pos)
    }

    /// Change the retained depth; excess oldest entries are evicted
    pub fn set_depth(&mut self, depth: usize) {
        self.capacity = depth + 1;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Number of retained entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No retained entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retained entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T> Default for BoundedHistory<T> {
    fn default() -> Self {
        Self::new(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_beyond_depth() {
        let mut history = BoundedHistory::new(4);
        for i in 0..6 {
            history.push(i);
        }
        assert_eq!(history.len(), 5);
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn take_removes_exactly_one() {
        let mut history = BoundedHistory::new(4);
        history.push("a");
        history.push("b");
        history.push("a");
        assert_eq!(history.take_where(|e| *e == "a"), Some("a"));
        assert_eq!(history.len(), 2);
        assert_eq!(history.take_where(|e| *e == "c"), None);
    }

    #[test]
    fn shrinking_depth_evicts() {
        let mut history = BoundedHistory::new(4);
        for i in 0..5 {
            history.push(i);
        }
        history.set_depth(1);
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![3, 4]);
    }
}
