//! Sparse counts storage.
//!
//! [`PackedCounts`] stores each count as up to 8 bytes spread over 8 byte-wide set trees inside a
//! [`PackedArrayContext`]. Storage is only spent on bytes that have ever been non-zero, which
//! keeps histograms with a wide configured range but few distinct recorded values small. Once the
//! packed representation would outgrow 16-bit pointers, the storage falls back to a dense array
//! transparently.

use crate::core::counter::Counter;
use crate::core::counts::Counts;
use std::marker::PhantomData;
use tracing::debug;

mod context;

pub use self::context::{
    PackedArrayContext, ResizeRequired, MAX_PACKED_PHYSICAL_LENGTH,
    MINIMUM_INITIAL_PACKED_ARRAY_CAPACITY, NUMBER_OF_SETS,
};

/// Counts stored in a [`PackedArrayContext`].
///
/// The context reports when it is out of room instead of growing by itself; `PackedCounts` then
/// replaces it with a larger copy and retries. Writes are idempotent, so a retried write that had
/// already stored some of its bytes is harmless.
#[derive(Clone, Debug)]
pub struct PackedCounts<T: Counter> {
    context: PackedArrayContext,
    phantom: PhantomData<T>,
}

impl<T: Counter> PackedCounts<T> {
    /// Create storage for `len` zero counts with room for at least `initial_physical_len` 64-bit
    /// slots before the first regrowth.
    pub fn with_physical_len(len: usize, initial_physical_len: usize) -> PackedCounts<T> {
        PackedCounts {
            context: PackedArrayContext::new(len, initial_physical_len),
            phantom: PhantomData,
        }
    }

    /// The underlying context.
    pub fn context(&self) -> &PackedArrayContext {
        &self.context
    }

    /// Allocated 64-bit slots.
    pub fn physical_len(&self) -> usize {
        self.context.physical_length()
    }

    /// Whether the counts are still kept in packed form.
    pub fn is_packed(&self) -> bool {
        self.context.is_packed()
    }

    fn get_raw(&self, index: usize) -> u64 {
        if !self.context.is_packed() {
            return self.context.get_at_unpacked_index(index);
        }

        let mut value = 0_u64;
        for set_number in 0..NUMBER_OF_SETS {
            match self.context.find_packed_index(set_number, index) {
                Some(byte_index) => {
                    let byte = u64::from(self.context.get_at_byte_index(byte_index));
                    value |= byte << (set_number << 3);
                }
                // higher sets are never populated when a lower one is missing
                None => return value,
            }
        }
        value
    }

    fn set_raw(&mut self, index: usize, value: u64) {
        loop {
            match self.try_set_raw(index, value) {
                Ok(()) => return,
                Err(resize) => self.grow(resize.new_physical_length),
            }
        }
    }

    fn try_set_raw(&mut self, index: usize, value: u64) -> Result<(), ResizeRequired> {
        if !self.context.is_packed() {
            self.context.set_at_unpacked_index(index, value);
            return Ok(());
        }

        let mut value_for_next_levels = value;
        for set_number in 0..NUMBER_OF_SETS {
            if value_for_next_levels == 0
                && self.context.find_packed_index(set_number, index).is_none()
            {
                // nothing here to clear, and no need to create it
                return Ok(());
            }
            if let Some(byte_index) = self.context.get_packed_index(set_number, index, true)? {
                self.context
                    .set_at_byte_index(byte_index, value_for_next_levels as u8);
            }
            value_for_next_levels >>= 8;
        }
        Ok(())
    }

    fn grow(&mut self, new_physical_length: usize) {
        let replacement = self
            .context
            .copy_and_increase_size(new_physical_length, self.context.virtual_length());

        if self.context.is_packed() && !replacement.is_packed() {
            debug!(
                virtual_length = replacement.virtual_length(),
                requested_physical_length = new_physical_length,
                "Packed counts exceeded the packed size limit, switching to dense storage."
            );
        } else {
            debug!(
                old_physical_length = self.context.physical_length(),
                new_physical_length = replacement.physical_length(),
                "Grew packed counts storage."
            );
        }

        self.context = replacement;
    }
}

impl<T: Counter> Counts<T> for PackedCounts<T> {
    fn with_len(len: usize) -> Self {
        PackedCounts::with_physical_len(len, MINIMUM_INITIAL_PACKED_ARRAY_CAPACITY)
    }

    #[inline]
    fn len(&self) -> usize {
        self.context.virtual_length()
    }

    fn get(&self, index: usize) -> T {
        assert!(index < self.len(), "index {} out of bounds", index);
        // every stored value was written from a T
        T::from_u64(self.get_raw(index)).expect("packed count does not fit the counter type")
    }

    fn set(&mut self, index: usize, count: T) {
        assert!(index < self.len(), "index {} out of bounds", index);
        self.set_raw(index, count.as_u64());
    }

    fn add(&mut self, index: usize, count: T) -> T {
        let current = self.get(index);
        if count == T::zero() {
            return current;
        }
        let updated = current.saturating_add(count);
        self.set(index, updated);
        updated
    }

    fn resize(&mut self, len: usize) {
        assert!(len >= self.len(), "counts storage never shrinks");
        if len == self.len() {
            return;
        }

        if self.context.is_packed()
            && PackedArrayContext::determine_top_level_shift(len) == self.context.top_level_shift()
        {
            self.context.set_virtual_length(len);
            return;
        }

        debug!(
            old_len = self.len(),
            new_len = len,
            "Copying packed counts into a deeper trie."
        );
        self.context = self
            .context
            .copy_and_increase_size(self.context.physical_length(), len);
    }

    fn clear(&mut self) {
        self.context.clear();
    }

    fn footprint(&self) -> usize {
        self.context.footprint()
    }
}
