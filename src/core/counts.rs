use crate::core::counter::Counter;
use std::fmt;

/// Storage for the per-index counts of a histogram.
///
/// A histogram addresses its counts by index only; how those counts are laid out in memory is up
/// to the implementation. `DenseCounts` keeps one counter per index, while
/// [`PackedCounts`](crate::packed::PackedCounts) only spends memory on the bytes that are actually
/// non-zero. The choice is made at construction time through the histogram's type parameter and
/// has no effect on recorded statistics.
///
/// Indexes passed to `get`, `set` and `add` must be below `len()`; implementations panic
/// otherwise, as that would indicate a broken index calculation in the histogram.
pub trait Counts<T: Counter>: Clone + fmt::Debug {
    /// Create storage for `len` zero counts.
    fn with_len(len: usize) -> Self;

    /// The number of addressable indexes.
    fn len(&self) -> usize;

    /// Returns true if there are no addressable indexes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The count at `index`.
    fn get(&self, index: usize) -> T;

    /// Overwrite the count at `index`.
    fn set(&mut self, index: usize, count: T);

    /// Add `count` to the count at `index`, saturating at the counter's maximum. Returns the new
    /// count.
    fn add(&mut self, index: usize, count: T) -> T {
        let updated = self.get(index).saturating_add(count);
        self.set(index, updated);
        updated
    }

    /// Grow to `len` addressable indexes. New indexes hold zero. Never shrinks.
    fn resize(&mut self, len: usize);

    /// Set every count to zero without changing `len()`.
    fn clear(&mut self);

    /// Approximate number of bytes of count storage currently allocated.
    fn footprint(&self) -> usize;
}

/// Counts stored as one counter per index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DenseCounts<T: Counter> {
    counts: Vec<T>,
}

impl<T: Counter> DenseCounts<T> {
    /// The counts as a slice, in index order.
    pub fn as_slice(&self) -> &[T] {
        &self.counts
    }
}

impl<T: Counter> Counts<T> for DenseCounts<T> {
    fn with_len(len: usize) -> Self {
        DenseCounts {
            counts: vec![T::zero(); len],
        }
    }

    #[inline]
    fn len(&self) -> usize {
        self.counts.len()
    }

    #[inline]
    fn get(&self, index: usize) -> T {
        self.counts[index]
    }

    #[inline]
    fn set(&mut self, index: usize, count: T) {
        self.counts[index] = count;
    }

    #[inline]
    fn add(&mut self, index: usize, count: T) -> T {
        let c = &mut self.counts[index];
        *c = c.saturating_add(count);
        *c
    }

    fn resize(&mut self, len: usize) {
        assert!(len >= self.counts.len(), "counts storage never shrinks");
        self.counts.resize(len, T::zero());
    }

    fn clear(&mut self) {
        for c in self.counts.iter_mut() {
            *c = T::zero();
        }
    }

    fn footprint(&self) -> usize {
        self.counts.len() * std::mem::size_of::<T>()
    }
}
