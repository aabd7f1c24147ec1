//! Sequence counter for optimistic concurrency control

use std::sync::atomic::{AtomicU64, Ordering, fence};

/// Even/odd sequence counter stored in a region header.
///
/// A writer makes the sequence odd, copies the payload, then makes it even
/// again. A reader that sees the same even value before and after its copy
/// holds a consistent snapshot.
#[derive(Debug)]
#[repr(transparent)]
pub struct Sequence(AtomicU64);

impl Sequence {
    /// Create a sequence starting at 0 (stable)
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Current value with acquire ordering
    #[inline]
    pub fn load(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Value for the closing check of a read, after an acquire fence
    #[inline]
    pub fn reload(&self) -> u64 {
        fence(Ordering::Acquire);
        self.0.load(Ordering::Relaxed)
    }

    /// Begin write operation - advance to odd
    #[inline]
    pub fn begin_write(&self) -> u64 {
        let next = self.0.fetch_add(1, Ordering::Relaxed) + 1;
        fence(Ordering::Release);
        next
    }

    /// Complete write operation - advance to even
    #[inline]
    pub fn end_write(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Release) + 1
    }

    /// Check if a value is stable (even)
    #[inline]
    pub fn is_stable(value: u64) -> bool {
        value % 2 == 0
    }

    /// Check if a value indicates a write in progress (odd)
    #[inline]
    pub fn is_writing(value: u64) -> bool {
        value % 2 == 1
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_creation() {
        let seq = Sequence::new();
        assert_eq!(seq.load(), 0);
        assert!(Sequence::is_stable(seq.load()));
    }

    #[test]
    fn test_write_cycle() {
        let seq = Sequence::new();

        let v1 = seq.begin_write();
        assert_eq!(v1, 1);
        assert!(Sequence::is_writing(v1));
        assert_eq!(seq.reload(), 1);

        let v2 = seq.end_write();
        assert_eq!(v2, 2);
        assert!(Sequence::is_stable(v2));
    }

    #[test]
    fn test_parity() {
        for v in [0, 2, 100] {
            assert!(Sequence::is_stable(v));
        }
        for v in [1, 3, 99] {
            assert!(Sequence::is_writing(v));
        }
    }
}
