use std::cmp;

/// Physical length (in 64-bit slots) that a newly created context is given at a minimum.
pub const MINIMUM_INITIAL_PACKED_ARRAY_CAPACITY: usize = 16;

/// Largest physical length (in 64-bit slots) that is kept in packed form.
///
/// Child pointers are 16-bit short indexes, and short indexes run four to a slot, so this is the
/// largest slot count whose short indexes all fit in a non-negative 16-bit pointer. A context that
/// would need more than this is created non-packed: a plain dense array of `virtual_length` slots.
pub const MAX_PACKED_PHYSICAL_LENGTH: usize = (i16::max_value() as usize) / 4;

/// Number of set trees, one per byte of a 64-bit value.
pub const NUMBER_OF_SETS: usize = 8;

const SET_0_START_INDEX: usize = 0;
const LEAF_LEVEL_SHIFT: u32 = 3;
const NON_LEAF_ENTRY_SLOT_INDICATORS_OFFSET: usize = 0;
const NON_LEAF_ENTRY_HEADER_SIZE_IN_SHORTS: usize = 1;
const PACKED_ARRAY_GROWTH_INCREMENT: usize = 16;
const PACKED_ARRAY_GROWTH_FRACTION_POW2: u32 = 4;

/// Written into the child-pointer shorts of a freshly allocated non-leaf entry. Each of those
/// shorts is overwritten before it is read; debug builds check that on every pointer read.
///
/// Pointers stay below `0x8000`, so a live pointer never equals this value. The slot indicator
/// short is a plain bitmap where `0xFFFF` means all 16 slots are in use, so it is never poisoned.
pub(crate) const POISON: u16 = 0xFFFF;

/// The context needs more physical storage than it currently has.
///
/// This is returned instead of growing in place: the owner builds a larger context with
/// [`PackedArrayContext::copy_and_increase_size`] and retries the operation against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeRequired {
    /// Minimum physical length (in 64-bit slots) for the replacement context.
    pub new_physical_length: usize,
}

/// Sparse storage for a virtual array of 64-bit values.
///
/// Each value is split into 8 bytes, and byte `n` of every value lives in set tree `n`. A set
/// tree is a radix trie over the virtual index: non-leaf entries consume 4 bits of the index per
/// level and consist of a 16-bit bitmap of populated slots followed by one 16-bit child pointer
/// per set bit, so an entry is only as large as its fan-out. The bottom 3 bits of the index
/// select a byte within a leaf, which is a single 64-bit slot shared by 8 neighbouring indexes.
///
/// Entries are appended at the end of the populated region. Expanding an entry copies it to a
/// new, larger location and leaves the old one as dead space; space is only reclaimed when the
/// context is copied.
#[derive(Clone, Debug)]
pub struct PackedArrayContext {
    array: Vec<u64>,
    is_packed: bool,
    populated_short_length: usize,
    virtual_length: usize,
    top_level_shift: u32,
}

impl PackedArrayContext {
    /// Create a context for `virtual_length` values with room for at least
    /// `initial_physical_length` slots.
    ///
    /// If the physical length exceeds [`MAX_PACKED_PHYSICAL_LENGTH`], the context is non-packed;
    /// check [`is_packed`](Self::is_packed) before using the packed accessors.
    pub fn new(virtual_length: usize, initial_physical_length: usize) -> PackedArrayContext {
        let mut physical_length = cmp::max(
            initial_physical_length,
            MINIMUM_INITIAL_PACKED_ARRAY_CAPACITY,
        );
        let is_packed = physical_length <= MAX_PACKED_PHYSICAL_LENGTH;
        if !is_packed {
            physical_length = virtual_length;
        }

        let mut ctx = PackedArrayContext {
            array: vec![0; physical_length],
            is_packed,
            populated_short_length: 0,
            virtual_length,
            top_level_shift: u32::max_value(),
        };
        ctx.init(virtual_length);
        ctx
    }

    fn init(&mut self, virtual_length: usize) {
        if !self.is_packed {
            self.virtual_length = virtual_length;
            return;
        }

        self.populated_short_length = SET_0_START_INDEX + NUMBER_OF_SETS;
        // empty root pointers
        for i in 0..NUMBER_OF_SETS {
            self.set_at_short_index(SET_0_START_INDEX + i, 0);
        }
        self.set_virtual_length(virtual_length);
    }

    /// Zero every value, keeping the physical allocation.
    pub fn clear(&mut self) {
        for w in self.array.iter_mut() {
            *w = 0;
        }
        let virtual_length = self.virtual_length;
        self.init(virtual_length);
    }

    /// Whether values are stored in set trees (`true`) or as a dense array (`false`).
    pub fn is_packed(&self) -> bool {
        self.is_packed
    }

    /// The logical length of the array.
    pub fn virtual_length(&self) -> usize {
        self.virtual_length
    }

    /// Allocated backing storage, in 64-bit slots.
    pub fn physical_length(&self) -> usize {
        self.array.len()
    }

    /// High-water mark of used 16-bit shorts.
    pub fn populated_short_length(&self) -> usize {
        self.populated_short_length
    }

    /// High-water mark of used 64-bit slots, rounded up.
    pub fn populated_long_length(&self) -> usize {
        (self.populated_short_length + 3) >> 2
    }

    fn set_populated_long_length(&mut self, populated_long_length: usize) {
        self.populated_short_length = populated_long_length << 2;
    }

    /// Shift applied to a virtual index to get the nibble used at the top level of each set tree.
    pub fn top_level_shift(&self) -> u32 {
        self.top_level_shift
    }

    /// Bytes of backing storage.
    pub fn footprint(&self) -> usize {
        self.array.len() * 8
    }

    /// The top level shift a set tree needs so that descending 4 bits at a time ends exactly at
    /// the leaf level for every index below `virtual_length`.
    pub fn determine_top_level_shift(virtual_length: usize) -> u32 {
        let size_magnitude = if virtual_length <= 1 {
            0
        } else {
            64 - ((virtual_length as u64) - 1).leading_zeros() as i32
        };
        let eights_size_magnitude = size_magnitude - 3;
        let multiple_of_four_size_magnitude =
            cmp::max((eights_size_magnitude + 3).div_euclid(4) * 4, 8);
        (multiple_of_four_size_magnitude - 4 + 3) as u32
    }

    /// Change the virtual length in place. Only valid for packed contexts, and only when the new
    /// length keeps the same trie depth; otherwise copy into a new context.
    pub fn set_virtual_length(&mut self, virtual_length: usize) {
        assert!(
            self.is_packed,
            "should never be adjusting the virtual length of a non-packed context"
        );
        let shift = Self::determine_top_level_shift(virtual_length);
        assert!(
            self.populated_short_length == SET_0_START_INDEX + NUMBER_OF_SETS
                || shift == self.top_level_shift,
            "changing trie depth in place would orphan populated entries"
        );
        self.top_level_shift = shift;
        self.virtual_length = virtual_length;
    }

    #[inline]
    fn get_at_short_index(&self, short_index: usize) -> u16 {
        (self.array[short_index >> 2] >> ((short_index & 3) << 4)) as u16
    }

    #[inline]
    fn set_at_short_index(&mut self, short_index: usize, value: u16) {
        let shift = (short_index & 3) << 4;
        let word = &mut self.array[short_index >> 2];
        *word = (*word & !(0xFFFF_u64 << shift)) | (u64::from(value) << shift);
    }

    #[inline]
    fn get_index_at_short_index(&self, short_index: usize) -> usize {
        let index = self.get_at_short_index(short_index);
        debug_assert_ne!(
            POISON, index,
            "read of an uninitialized packed array entry at short {}",
            short_index
        );
        usize::from(index)
    }

    /// Read one byte of a leaf. `byte_index` comes from [`get_packed_index`](Self::get_packed_index).
    #[inline]
    pub fn get_at_byte_index(&self, byte_index: usize) -> u8 {
        (self.array[byte_index >> 3] >> ((byte_index & 7) << 3)) as u8
    }

    /// Write one byte of a leaf. `byte_index` comes from [`get_packed_index`](Self::get_packed_index).
    #[inline]
    pub fn set_at_byte_index(&mut self, byte_index: usize, value: u8) {
        let shift = (byte_index & 7) << 3;
        let word = &mut self.array[byte_index >> 3];
        *word = (*word & !(0xFF_u64 << shift)) | (u64::from(value) << shift);
    }

    /// Value at `index` of a non-packed context.
    #[inline]
    pub fn get_at_unpacked_index(&self, index: usize) -> u64 {
        debug_assert!(!self.is_packed);
        self.array[index]
    }

    /// Overwrite the value at `index` of a non-packed context.
    #[inline]
    pub fn set_at_unpacked_index(&mut self, index: usize, value: u64) {
        debug_assert!(!self.is_packed);
        self.array[index] = value;
    }

    #[inline]
    fn get_packed_slot_indicators(&self, entry_index: usize) -> u16 {
        self.get_at_short_index(entry_index + NON_LEAF_ENTRY_SLOT_INDICATORS_OFFSET)
    }

    #[inline]
    fn set_packed_slot_indicators(&mut self, entry_index: usize, indicators: u16) {
        self.set_at_short_index(entry_index + NON_LEAF_ENTRY_SLOT_INDICATORS_OFFSET, indicators);
    }

    #[inline]
    fn get_index_at_entry_slot(&self, entry_index: usize, slot: usize) -> usize {
        self.get_index_at_short_index(entry_index + NON_LEAF_ENTRY_HEADER_SIZE_IN_SHORTS + slot)
    }

    #[inline]
    fn set_index_at_entry_slot(&mut self, entry_index: usize, slot: usize, value: usize) {
        self.set_at_short_index(
            entry_index + NON_LEAF_ENTRY_HEADER_SIZE_IN_SHORTS + slot,
            to_pointer(value),
        );
    }

    fn expand_array_if_needed(&self, entry_length_in_longs: usize) -> Result<(), ResizeRequired> {
        let current_length = self.physical_length();
        let populated_long_length = self.populated_long_length();
        if current_length < populated_long_length + entry_length_in_longs {
            let growth_increment = cmp::max(
                entry_length_in_longs,
                cmp::max(
                    PACKED_ARRAY_GROWTH_INCREMENT,
                    populated_long_length >> PACKED_ARRAY_GROWTH_FRACTION_POW2,
                ),
            );
            return Err(ResizeRequired {
                new_physical_length: current_length + growth_increment,
            });
        }
        Ok(())
    }

    /// Allocate a non-leaf entry at the end of the populated region. Every short of it is
    /// poisoned.
    fn new_entry(&mut self, entry_length_in_shorts: usize) -> Result<usize, ResizeRequired> {
        let new_entry_index = self.populated_short_length;
        self.expand_array_if_needed((entry_length_in_shorts >> 2) + 1)?;
        self.populated_short_length = new_entry_index + entry_length_in_shorts;
        self.set_packed_slot_indicators(new_entry_index, 0);
        for i in NON_LEAF_ENTRY_HEADER_SIZE_IN_SHORTS..entry_length_in_shorts {
            self.set_at_short_index(new_entry_index + i, POISON);
        }
        Ok(new_entry_index)
    }

    /// Allocate a zeroed leaf slot. Returns its long index.
    fn new_leaf_entry(&mut self) -> Result<usize, ResizeRequired> {
        let new_entry_index = self.populated_long_length();
        self.expand_array_if_needed(1)?;
        self.set_populated_long_length(new_entry_index + 1);
        self.array[new_entry_index] = 0;
        Ok(new_entry_index)
    }

    /// Replace the entry at `existing_entry_index` with a copy that has one more slot, and point
    /// the slot at a new next-level entry (or leaf).
    fn expand_entry(
        &mut self,
        existing_entry_index: usize,
        entry_pointer_index: usize,
        inserted_slot_index: usize,
        inserted_slot_mask: u16,
        next_level_is_leaf: bool,
    ) -> Result<usize, ResizeRequired> {
        let existing_indicators = self.get_packed_slot_indicators(existing_entry_index);
        let packed_slot_indicators = existing_indicators | inserted_slot_mask;
        let number_of_slots_in_expanded_entry = packed_slot_indicators.count_ones() as usize;
        assert!(
            inserted_slot_index < number_of_slots_in_expanded_entry,
            "inserted slot index is out of range given provided masks"
        );
        let expanded_entry_length =
            number_of_slots_in_expanded_entry + NON_LEAF_ENTRY_HEADER_SIZE_IN_SHORTS;

        let index_of_new_next_level_entry = if next_level_is_leaf {
            self.new_leaf_entry()?
        } else {
            let i = self.new_entry(NON_LEAF_ENTRY_HEADER_SIZE_IN_SHORTS)?;
            self.set_packed_slot_indicators(i, 0);
            i
        };

        let expanded_entry_index = self.new_entry(expanded_entry_length)?;
        self.set_packed_slot_indicators(expanded_entry_index, packed_slot_indicators);
        self.set_index_at_entry_slot(
            expanded_entry_index,
            inserted_slot_index,
            index_of_new_next_level_entry,
        );

        for slot in 0..inserted_slot_index {
            let v = self.get_index_at_entry_slot(existing_entry_index, slot);
            self.set_index_at_entry_slot(expanded_entry_index, slot, v);
        }
        for dest_slot in (inserted_slot_index + 1)..number_of_slots_in_expanded_entry {
            let v = self.get_index_at_entry_slot(existing_entry_index, dest_slot - 1);
            self.set_index_at_entry_slot(expanded_entry_index, dest_slot, v);
        }

        self.set_at_short_index(entry_pointer_index, to_pointer(expanded_entry_index));
        Ok(expanded_entry_index)
    }

    fn get_root_entry(
        &mut self,
        set_number: usize,
        insert_as_needed: bool,
    ) -> Result<usize, ResizeRequired> {
        let entry_pointer_index = SET_0_START_INDEX + set_number;
        let mut entry_index = self.get_index_at_short_index(entry_pointer_index);

        if entry_index == 0 {
            if !insert_as_needed {
                return Ok(0);
            }
            entry_index = self.new_entry(NON_LEAF_ENTRY_HEADER_SIZE_IN_SHORTS)?;
            self.set_packed_slot_indicators(entry_index, 0);
            self.set_at_short_index(entry_pointer_index, to_pointer(entry_index));
        }
        Ok(entry_index)
    }

    /// Byte index (for [`get_at_byte_index`](Self::get_at_byte_index) and
    /// [`set_at_byte_index`](Self::set_at_byte_index)) of byte `set_number` of the value at
    /// `virtual_index`.
    ///
    /// Returns `Ok(None)` if the byte has never been populated and `insert_as_needed` is false.
    /// With `insert_as_needed`, missing trie entries are created along the way; if that needs more
    /// room than is allocated, `Err(ResizeRequired)` is returned and the caller must retry on a
    /// larger copy of this context.
    pub fn get_packed_index(
        &mut self,
        set_number: usize,
        virtual_index: usize,
        insert_as_needed: bool,
    ) -> Result<Option<usize>, ResizeRequired> {
        if !insert_as_needed {
            return Ok(self.find_packed_index(set_number, virtual_index));
        }
        self.check_packed_access(set_number, virtual_index);

        let mut entry_pointer_index = SET_0_START_INDEX + set_number;
        let mut entry_index = self.get_root_entry(set_number, true)?;

        let mut index_shift = self.top_level_shift;
        loop {
            let next_level_is_leaf = index_shift == LEAF_LEVEL_SHIFT;
            let packed_slot_indicators = self.get_packed_slot_indicators(entry_index);
            let slot_bit_number = (virtual_index >> index_shift) & 0xf;
            let slot_mask = 1_u16 << slot_bit_number;
            let slot_number = (packed_slot_indicators & (slot_mask - 1)).count_ones() as usize;

            if (packed_slot_indicators & slot_mask) == 0 {
                entry_index = self.expand_entry(
                    entry_index,
                    entry_pointer_index,
                    slot_number,
                    slot_mask,
                    next_level_is_leaf,
                )?;
            }

            entry_pointer_index = entry_index + NON_LEAF_ENTRY_HEADER_SIZE_IN_SHORTS + slot_number;
            entry_index = self.get_index_at_short_index(entry_pointer_index);

            if next_level_is_leaf {
                break;
            }
            index_shift -= 4;
        }

        // entry_index is now the long index of the leaf
        Ok(Some((entry_index << 3) + (virtual_index & 0x7)))
    }

    /// Read-only lookup of the byte index of byte `set_number` of the value at `virtual_index`.
    pub fn find_packed_index(&self, set_number: usize, virtual_index: usize) -> Option<usize> {
        self.check_packed_access(set_number, virtual_index);

        let mut entry_index = self.get_index_at_short_index(SET_0_START_INDEX + set_number);
        if entry_index == 0 {
            return None;
        }

        let mut index_shift = self.top_level_shift;
        loop {
            let packed_slot_indicators = self.get_packed_slot_indicators(entry_index);
            let slot_mask = 1_u16 << ((virtual_index >> index_shift) & 0xf);
            if (packed_slot_indicators & slot_mask) == 0 {
                return None;
            }
            let slot_number = (packed_slot_indicators & (slot_mask - 1)).count_ones() as usize;
            entry_index = self.get_index_at_entry_slot(entry_index, slot_number);

            if index_shift == LEAF_LEVEL_SHIFT {
                break;
            }
            index_shift -= 4;
        }

        Some((entry_index << 3) + (virtual_index & 0x7))
    }

    #[inline]
    fn check_packed_access(&self, set_number: usize, virtual_index: usize) {
        assert!(self.is_packed, "packed access to a non-packed context");
        assert!(set_number < NUMBER_OF_SETS);
        assert!(
            virtual_index < self.virtual_length,
            "attempting access at index {}, beyond virtual length {}",
            virtual_index,
            self.virtual_length
        );
    }

    /// Build a context with the same contents, at least `new_physical_length` slots, and
    /// `new_virtual_length` (which must not be smaller than the current one).
    ///
    /// Every populated set tree is copied level by level, dropping dead entries; leaf slots are
    /// copied bit for bit. A non-packed context only ever copies into another non-packed one.
    pub fn copy_and_increase_size(
        &self,
        new_physical_length: usize,
        new_virtual_length: usize,
    ) -> PackedArrayContext {
        let mut physical_length = if self.is_packed {
            new_physical_length
        } else {
            cmp::max(new_physical_length, MAX_PACKED_PHYSICAL_LENGTH + 1)
        };

        loop {
            let mut ctx = PackedArrayContext::new(new_virtual_length, physical_length);
            match ctx.populate_equivalent_entries_with_entries_from_other(self) {
                Ok(()) => return ctx,
                Err(resize) => physical_length = resize.new_physical_length,
            }
        }
    }

    fn populate_equivalent_entries_with_entries_from_other(
        &mut self,
        other: &PackedArrayContext,
    ) -> Result<(), ResizeRequired> {
        assert!(
            self.virtual_length >= other.virtual_length,
            "cannot populate array of smaller virtual length"
        );

        if !self.is_packed {
            if other.is_packed {
                let array = &mut self.array;
                other.for_each_leaf(|base_index, leaf, set_number| {
                    for b in 0..8 {
                        let byte = (leaf >> (b << 3)) & 0xFF;
                        if byte != 0 {
                            array[base_index + b] |= byte << (set_number << 3);
                        }
                    }
                });
            } else {
                self.array[..other.virtual_length]
                    .copy_from_slice(&other.array[..other.virtual_length]);
            }
            return Ok(());
        }

        assert!(
            other.is_packed,
            "a non-packed context never converts back to packed storage"
        );

        for set_number in 0..NUMBER_OF_SETS {
            let other_entry_index = other.get_index_at_short_index(SET_0_START_INDEX + set_number);
            if other_entry_index == 0 {
                continue;
            }

            // A deeper trie gets single-slot entries on top, all on slot 0 since every existing
            // index is below the old virtual length.
            let mut entry_index_pointer = SET_0_START_INDEX + set_number;
            let mut shift = self.top_level_shift;
            while shift > other.top_level_shift {
                let entry_index = self.new_entry(NON_LEAF_ENTRY_HEADER_SIZE_IN_SHORTS + 1)?;
                self.set_at_short_index(entry_index_pointer, to_pointer(entry_index));
                self.set_packed_slot_indicators(entry_index, 1);
                entry_index_pointer = entry_index + NON_LEAF_ENTRY_HEADER_SIZE_IN_SHORTS;
                shift -= 4;
            }

            self.copy_entries_at_level_from_other(
                other,
                other_entry_index,
                entry_index_pointer,
                other.top_level_shift,
            )?;
        }
        Ok(())
    }

    fn copy_entries_at_level_from_other(
        &mut self,
        other: &PackedArrayContext,
        other_level_entry_index: usize,
        level_entry_index_pointer: usize,
        other_level_shift: u32,
    ) -> Result<(), ResizeRequired> {
        let next_level_is_leaf = other_level_shift == LEAF_LEVEL_SHIFT;
        let packed_slot_indicators = other.get_packed_slot_indicators(other_level_entry_index);
        let number_of_slots = packed_slot_indicators.count_ones() as usize;
        let entry_index = self.new_entry(NON_LEAF_ENTRY_HEADER_SIZE_IN_SHORTS + number_of_slots)?;

        self.set_at_short_index(level_entry_index_pointer, to_pointer(entry_index));
        self.set_packed_slot_indicators(entry_index, packed_slot_indicators);

        for slot in 0..number_of_slots {
            let other_next_level_entry_index =
                other.get_index_at_entry_slot(other_level_entry_index, slot);
            if next_level_is_leaf {
                let leaf_entry_index = self.new_leaf_entry()?;
                self.set_index_at_entry_slot(entry_index, slot, leaf_entry_index);
                self.array[leaf_entry_index] = other.array[other_next_level_entry_index];
            } else {
                self.copy_entries_at_level_from_other(
                    other,
                    other_next_level_entry_index,
                    entry_index + NON_LEAF_ENTRY_HEADER_SIZE_IN_SHORTS + slot,
                    other_level_shift - 4,
                )?;
            }
        }
        Ok(())
    }

    /// Visit every leaf of every set tree, in ascending index order within each set. The callback
    /// receives the virtual index of the leaf's first byte, the leaf slot, and the set number.
    pub(crate) fn for_each_leaf<F: FnMut(usize, u64, usize)>(&self, mut f: F) {
        assert!(self.is_packed);
        for set_number in 0..NUMBER_OF_SETS {
            let root = self.get_index_at_short_index(SET_0_START_INDEX + set_number);
            if root != 0 {
                self.visit_leaves(root, self.top_level_shift, 0, set_number, &mut f);
            }
        }
    }

    fn visit_leaves<F: FnMut(usize, u64, usize)>(
        &self,
        entry_index: usize,
        index_shift: u32,
        base_index: usize,
        set_number: usize,
        f: &mut F,
    ) {
        let packed_slot_indicators = self.get_packed_slot_indicators(entry_index);
        let mut slot = 0;
        for bit in 0..16 {
            if packed_slot_indicators & (1 << bit) == 0 {
                continue;
            }
            let child = self.get_index_at_entry_slot(entry_index, slot);
            let child_base = base_index | (bit << index_shift);
            if index_shift == LEAF_LEVEL_SHIFT {
                f(child_base, self.array[child], set_number);
            } else {
                self.visit_leaves(child, index_shift - 4, child_base, set_number, f);
            }
            slot += 1;
        }
    }

    /// Check the structural invariants of every set tree: no poisoned pointers are reachable and
    /// every pointer stays inside the populated region.
    #[cfg(test)]
    pub(crate) fn check_integrity(&self) {
        if !self.is_packed {
            return;
        }
        for set_number in 0..NUMBER_OF_SETS {
            let root = usize::from(self.get_at_short_index(SET_0_START_INDEX + set_number));
            assert_ne!(usize::from(POISON), root);
            if root != 0 {
                self.check_entry(root, self.top_level_shift);
            }
        }
    }

    #[cfg(test)]
    fn check_entry(&self, entry_index: usize, index_shift: u32) {
        assert!(entry_index < self.populated_short_length);
        let indicators = self.get_packed_slot_indicators(entry_index);
        for slot in 0..(indicators.count_ones() as usize) {
            let child = usize::from(
                self.get_at_short_index(entry_index + NON_LEAF_ENTRY_HEADER_SIZE_IN_SHORTS + slot),
            );
            assert_ne!(usize::from(POISON), child);
            if index_shift == LEAF_LEVEL_SHIFT {
                assert!(child < self.populated_long_length());
            } else {
                self.check_entry(child, index_shift - 4);
            }
        }
    }
}

#[inline]
fn to_pointer(index: usize) -> u16 {
    debug_assert!(index < usize::from(POISON), "pointer {} does not fit in 16 bits", index);
    index as u16
}
