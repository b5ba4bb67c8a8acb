//! Fixed-capacity overwrite-oldest ring
//!
//! Storage is allocated once at construction. Appending to a full ring
//! overwrites the slot at the write cursor, which always holds the oldest
//! element, so the ring retains the most recent `capacity` items.

use crate::error::RingError;

/// Circular buffer that silently drops its oldest entry on overflow
#[derive(Debug, Clone)]
pub struct Ring<T> {
    slots: Box<[Option<T>]>,
    /// Next slot to write
    cursor: usize,
    count: usize,
}

impl<T> Ring<T> {
    /// Create an empty ring
    ///
    /// # Errors
    ///
    /// Returns [`RingError::ZeroCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, RingError> {
        if capacity == 0 {
            return Err(RingError::ZeroCapacity);
        }
        let slots: Vec<Option<T>> = (0..capacity).map(|_| None).collect();
        Ok(Self {
            slots: slots.into_boxed_slice(),
            cursor: 0,
            count: 0,
        })
    }

    /// Append an item, discarding the oldest one if the ring is full
    pub fn push(&mut self, item: T) {
        let capacity = self.slots.len();
        self.slots[self.cursor] = Some(item);
        self.cursor = (self.cursor + 1) % capacity;
        if self.count < capacity {
            self.count += 1;
        }
    }

    /// Number of items currently held
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterate oldest-first, independent of the physical layout
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let capacity = self.slots.len();
        // Before the first wrap the oldest item sits at slot 0; after it,
        // the cursor points at the oldest item.
        let start = if self.count < capacity { 0 } else { self.cursor };
        (0..self.count).filter_map(move |i| self.slots[(start + i) % capacity].as_ref())
    }

    /// Drop every item, keeping the allocated storage
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.cursor = 0;
        self.count = 0;
    }
}

impl<T: Clone> Ring<T> {
    /// Copy the contents out, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.count);
        out.extend(self.iter().cloned());
        out
    }
}
