//! Fixed-capacity trailing window.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// The most recent `capacity` items, oldest first.
///
/// Eviction is purely by arrival order: pushing into a full window drops
/// the oldest entry. Whether the window has ever been full is tracked
/// separately from its length.
#[derive(Debug, Clone)]
pub struct SlidingWindow<T> {
    entries: VecDeque<T>,
    capacity: NonZeroUsize,
    filled: bool,
    received: u64,
}

impl<T> SlidingWindow<T> {
    /// Create an empty window.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.get()),
            capacity,
            filled: false,
            received: 0,
        }
    }

    /// Append an item, returning the evicted oldest item if the window was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.entries.len() == self.capacity.get() {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(item);
        self.received += 1;
        if self.entries.len() == self.capacity.get() {
            self.filled = true;
        }
        evicted
    }

    /// Whether the window has reached capacity at least once.
    pub fn is_full(&self) -> bool {
        self.filled
    }

    /// The oldest item still in the window.
    pub fn oldest(&self) -> Option<&T> {
        self.entries.front()
    }

    /// The most recently pushed item.
    pub fn newest(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Total number of items ever pushed.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Items oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}
