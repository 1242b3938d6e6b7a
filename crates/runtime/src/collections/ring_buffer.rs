//! Fixed-capacity history buffer that overwrites its oldest element.
//!
//! [`RingBuffer`] backs every metrics key: appends are O(1), length never
//! exceeds the configured capacity, and iteration runs oldest to newest so a
//! snapshot preserves completion order.

use std::collections::VecDeque;

/// Bounded first-in-first-out buffer.
///
/// ```rust
/// use bulwark_runtime::collections::RingBuffer;
///
/// let mut history = RingBuffer::new(3);
/// for latency_ms in [12, 18, 25, 31] {
///     history.push(latency_ms);
/// }
///
/// assert_eq!(history.to_vec(), vec![18, 25, 31]);
/// assert_eq!(history.dropped(), 1);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    capacity: usize,
    dropped: u64,
}

impl<T> RingBuffer<T> {
    /// Creates a buffer holding at most `capacity` items.
    ///
    /// A capacity of zero is clamped to `1`.
    #[inline]
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { buf: VecDeque::with_capacity(capacity), capacity, dropped: 0 }
    }

    /// Appends `item`, returning the evicted oldest item when the buffer was
    /// full.
    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.is_full() { self.buf.pop_front() } else { None };
        if evicted.is_some() {
            self.dropped = self.dropped.saturating_add(1);
        }
        self.buf.push_back(item);
        evicted
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items overwritten since creation.
    #[inline]
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Iterates from oldest to newest.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copies the contents, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for collections::ring_buffer.
    use super::RingBuffer;

    /// Validates `RingBuffer::push` behavior for the overflow scenario.
    ///
    /// Assertions:
    /// - Confirms the evicted value is the oldest one.
    /// - Confirms `len()` never exceeds `capacity()`.
    /// - Confirms `dropped()` counts every overwrite.
    #[test]
    fn push_overwrites_oldest_and_counts_drops() {
        let mut buffer = RingBuffer::new(3);
        assert_eq!(buffer.push(1), None);
        assert_eq!(buffer.push(2), None);
        assert_eq!(buffer.push(3), None);
        assert_eq!(buffer.push(4), Some(1));
        assert_eq!(buffer.push(5), Some(2));

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.capacity(), 3);
        assert_eq!(buffer.dropped(), 2);
        assert_eq!(buffer.to_vec(), vec![3, 4, 5]);
        assert!(buffer.is_full());
    }

    /// Validates `RingBuffer::new` behavior for the zero capacity scenario.
    ///
    /// Assertions:
    /// - Confirms `capacity()` equals `1`.
    /// - Confirms only the most recent push survives.
    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut buffer = RingBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);

        buffer.push(42);
        buffer.push(43);

        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![43]);
    }

    #[test]
    fn empty_buffer_has_no_drops() {
        let mut buffer: RingBuffer<u8> = RingBuffer::new(4);
        assert!(buffer.is_empty());
        assert!(buffer.to_vec().is_empty());

        buffer.push(7);
        assert!(!buffer.is_full());
        assert_eq!(buffer.dropped(), 0);
    }
}
