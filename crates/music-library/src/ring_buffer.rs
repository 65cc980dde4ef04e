//! Fixed-capacity circular buffer.
//!
//! Backing storage is allocated once; pushes beyond capacity overwrite the
//! oldest slot. Used for the recent-skip window and the recent-recommendation
//! history.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    /// Index of the next slot to write
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` items (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots, head: 0, len: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Push an item, returning the evicted oldest item when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = self.slots[self.head].replace(item);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        evicted
    }

    /// Most recently pushed item.
    pub fn newest(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.head + self.capacity() - 1) % self.capacity();
        self.slots[idx].as_ref()
    }

    /// Iterate newest first.
    pub fn iter_newest(&self) -> impl Iterator<Item = &T> + '_ {
        let cap = self.capacity();
        (1..=self.len).filter_map(move |offset| self.slots[(self.head + cap - offset) % cap].as_ref())
    }

    /// Iterate oldest first.
    pub fn iter_oldest(&self) -> impl Iterator<Item = &T> + '_ {
        let cap = self.capacity();
        let start = (self.head + cap - self.len) % cap;
        (0..self.len).filter_map(move |offset| self.slots[(start + offset) % cap].as_ref())
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }

    /// Drain into a deque ordered oldest first.
    pub fn drain_oldest(&mut self) -> VecDeque<T> {
        let cap = self.capacity();
        let start = (self.head + cap - self.len) % cap;
        let mut out = VecDeque::with_capacity(self.len);
        for offset in 0..self.len {
            if let Some(item) = self.slots[(start + offset) % cap].take() {
                out.push_back(item);
            }
        }
        self.head = 0;
        self.len = 0;
        out
    }
}

impl<T: PartialEq> RingBuffer<T> {
    pub fn contains(&self, item: &T) -> bool {
        self.iter_oldest().any(|x| x == item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_within_capacity() {
        let mut ring = RingBuffer::with_capacity(3);
        assert!(ring.is_empty());
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.newest(), Some(&2));
        assert_eq!(ring.iter_oldest().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_evicts_oldest() {
        let mut ring = RingBuffer::with_capacity(3);
        for i in 1..=3 {
            ring.push(i);
        }
        assert!(ring.is_full());
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.iter_newest().copied().collect::<Vec<_>>(), vec![4, 3, 2]);
        assert_eq!(ring.iter_oldest().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert!(!ring.contains(&1));
        assert!(ring.contains(&3));
    }

    #[test]
    fn test_clear_and_drain() {
        let mut ring = RingBuffer::with_capacity(2);
        ring.push("a");
        ring.push("b");
        ring.push("c");
        let drained: Vec<_> = ring.drain_oldest().into_iter().collect();
        assert_eq!(drained, vec!["b", "c"]);
        assert!(ring.is_empty());

        ring.push("d");
        ring.clear();
        assert_eq!(ring.newest(), None);
        assert_eq!(ring.capacity(), 2);
    }

    #[test]
    fn test_zero_capacity_is_one() {
        let mut ring = RingBuffer::with_capacity(0);
        ring.push(1);
        assert_eq!(ring.push(2), Some(1));
        assert_eq!(ring.len(), 1);
    }
}
