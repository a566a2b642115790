//! Atomic per-worker bitmap.
//!
//! Keeps the bit arithmetic for the availability and shutdown bitmaps out of
//! the scheduling logic. Bit `i` belongs to worker `i`. Writes are `AcqRel`
//! and reads are `Acquire`, so everything a worker did before setting its bit
//! is visible to whoever observes the bit.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

/// A cache-padded `AtomicU64` addressed by worker index.
#[derive(Debug, Default)]
pub struct ThreadMask(CachePadded<AtomicU64>);

impl ThreadMask {
    /// Number of workers one mask can track.
    pub const CAPACITY: usize = u64::BITS as usize;

    /// Creates a mask with every bit clear.
    #[must_use]
    pub fn new() -> Self {
        Self(CachePadded::new(AtomicU64::new(0)))
    }

    /// The bits covering workers `0..count`.
    #[must_use]
    pub const fn active_bits(count: usize) -> u64 {
        if count >= Self::CAPACITY {
            u64::MAX
        } else {
            (1u64 << count) - 1
        }
    }

    #[inline]
    fn bit(index: usize) -> u64 {
        debug_assert!(index < Self::CAPACITY, "worker index {index} out of range");
        1u64 << index
    }

    /// Sets bit `index`. Returns `true` if it was previously clear.
    #[inline]
    pub fn set(&self, index: usize) -> bool {
        let bit = Self::bit(index);
        self.0.fetch_or(bit, Ordering::AcqRel) & bit == 0
    }

    /// Clears bit `index`. Returns `true` if it was previously set.
    #[inline]
    pub fn clear(&self, index: usize) -> bool {
        let bit = Self::bit(index);
        self.0.fetch_and(!bit, Ordering::AcqRel) & bit != 0
    }

    /// Returns whether bit `index` is set.
    #[inline]
    #[must_use]
    pub fn is_set(&self, index: usize) -> bool {
        self.load() & Self::bit(index) != 0
    }

    /// Returns whether every bit in `0..count` is set.
    #[inline]
    #[must_use]
    pub fn all_set(&self, count: usize) -> bool {
        let active = Self::active_bits(count);
        self.load() & active == active
    }

    /// Bits in `0..count` that are still clear.
    #[must_use]
    pub fn clear_bits(&self, count: usize) -> u64 {
        !self.load() & Self::active_bits(count)
    }

    /// Snapshot of the raw bitmap.
    #[inline]
    #[must_use]
    pub fn load(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    // Availability vocabulary: set = idle, clear = busy.

    /// Marks worker `index` idle and ready for work.
    #[inline]
    pub fn mark_idle(&self, index: usize) {
        self.set(index);
    }

    /// Marks worker `index` busy.
    #[inline]
    pub fn mark_busy(&self, index: usize) {
        self.clear(index);
    }

    /// Returns whether workers `0..count` are all idle.
    #[inline]
    #[must_use]
    pub fn all_idle(&self, count: usize) -> bool {
        self.all_set(count)
    }
}
