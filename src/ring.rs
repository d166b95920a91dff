//! Fixed-capacity ring buffer
//!
//! Holds the most recent `capacity` items in arrival order. Inserting into a
//! full buffer evicts the oldest item. Index 0 is always the oldest element.
//!
//! Used for the catch-up window replayed to late-joining listeners, and for
//! the song/error histories kept by the station monitor.
//!
//! Not synchronized; the engine guards its instance with the broadcast lock.

use std::collections::VecDeque;

/// Overwrite-oldest circular container
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer holding at most `capacity` items
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, evicting the oldest one if the buffer is full
    pub fn add(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Append every item in order
    pub fn add_all<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        for item in items {
            self.add(item);
        }
    }

    /// Item at logical position `index` (0 = oldest)
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy of the contents, oldest to newest
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T> std::ops::Index<usize> for RingBuffer<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.items[index]
    }
}
