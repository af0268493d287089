//! Bit layers over the slot index space and register-level scanning.
//!
//! A [`BitLayer`] holds one bit per slot, grouped into 64-bit registers
//! and allocated one block at a time so it always mirrors the arena. The
//! validity mask and every user mask are `BitLayer`s. A [`Selection`]
//! combines the validity layer with an optional user layer, and all scans
//! (cursor advance, bound maintenance, traversal) test whole registers and
//! use `trailing_zeros` to jump between set bits.

use crate::position::{BlockGeometry, Position, REGISTER_WIDTH};

/// One bit per slot, stored block by block.
#[derive(Clone, Debug)]
pub(crate) struct BitLayer {
    blocks: Vec<Box<[u64]>>,
    registers_per_block: usize,
}

impl BitLayer {
    /// A zeroed layer covering `block_count` blocks.
    pub(crate) fn new(registers_per_block: usize, block_count: usize) -> Self {
        let mut layer = Self {
            blocks: Vec::with_capacity(block_count),
            registers_per_block,
        };
        for _ in 0..block_count {
            layer.push_block();
        }
        layer
    }

    /// Append one block of zero bits.
    pub(crate) fn push_block(&mut self) {
        self.blocks
            .push(vec![0u64; self.registers_per_block].into_boxed_slice());
    }

    pub(crate) fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Registers of one block.
    pub(crate) fn block(&self, block: usize) -> &[u64] {
        &self.blocks[block]
    }

    /// Whether the bit for `pos` is set. Positions past the last block read
    /// as clear.
    pub(crate) fn contains(&self, pos: Position) -> bool {
        self.blocks
            .get(pos.block)
            .is_some_and(|regs| regs[pos.register()] & pos.bit_mask() != 0)
    }

    /// Set the bit for `pos`. Returns `true` if it was previously clear.
    pub(crate) fn insert(&mut self, pos: Position) -> bool {
        let reg = &mut self.blocks[pos.block][pos.register()];
        let was_clear = *reg & pos.bit_mask() == 0;
        *reg |= pos.bit_mask();
        was_clear
    }

    /// Clear the bit for `pos`. Returns `true` if it was previously set.
    pub(crate) fn remove(&mut self, pos: Position) -> bool {
        let reg = &mut self.blocks[pos.block][pos.register()];
        let was_set = *reg & pos.bit_mask() != 0;
        *reg &= !pos.bit_mask();
        was_set
    }

    /// Zero every register without releasing the blocks.
    pub(crate) fn clear(&mut self) {
        for regs in &mut self.blocks {
            regs.fill(0);
        }
    }

    /// Population count across all blocks.
    #[cfg(test)]
    pub(crate) fn count_ones(&self) -> usize {
        self.blocks
            .iter()
            .flat_map(|regs| regs.iter())
            .map(|w| w.count_ones() as usize)
            .sum()
    }
}

/// Word with bits `0..=bit` set.
pub(crate) fn low_bits(bit: u32) -> u64 {
    if bit as usize == REGISTER_WIDTH - 1 {
        !0
    } else {
        (1u64 << (bit + 1)) - 1
    }
}

/// Word with bits `bit..64` set.
pub(crate) fn high_bits(bit: u32) -> u64 {
    !0u64 << bit
}

/// How a user layer narrows the validity layer.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Filter<'a> {
    /// Every valid slot.
    All,
    /// Valid slots whose bit is set in the layer.
    Masked(&'a BitLayer),
    /// Valid slots whose bit is clear in the layer.
    Unmasked(&'a BitLayer),
}

/// The validity layer narrowed by a [`Filter`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct Selection<'a> {
    validity: &'a BitLayer,
    filter: Filter<'a>,
    geometry: BlockGeometry,
}

impl<'a> Selection<'a> {
    pub(crate) fn new(validity: &'a BitLayer, filter: Filter<'a>, geometry: BlockGeometry) -> Self {
        Self {
            validity,
            filter,
            geometry,
        }
    }

    /// Selected bits of one register.
    #[inline]
    pub(crate) fn word(&self, block: usize, register: usize) -> u64 {
        let valid = self.validity.block(block)[register];
        match self.filter {
            Filter::All => valid,
            Filter::Masked(layer) => valid & layer.block(block)[register],
            Filter::Unmasked(layer) => valid & !layer.block(block)[register],
        }
    }

    /// Selected bits of a register numbered across all blocks.
    #[inline]
    fn global_word(&self, global_register: usize) -> u64 {
        let (block, register) = self.geometry.split_register(global_register);
        self.word(block, register)
    }

    /// First selected index in `[from, last]`.
    pub(crate) fn next_from(&self, from: usize, last: usize) -> Option<usize> {
        if from > last {
            return None;
        }
        let end_register = last / REGISTER_WIDTH;
        let mut register = from / REGISTER_WIDTH;
        let mut word = self.global_word(register) & high_bits((from % REGISTER_WIDTH) as u32);
        loop {
            if register == end_register {
                word &= low_bits((last % REGISTER_WIDTH) as u32);
            }
            if word != 0 {
                return Some(register * REGISTER_WIDTH + word.trailing_zeros() as usize);
            }
            if register == end_register {
                return None;
            }
            register += 1;
            word = self.global_word(register);
        }
    }

    /// Last selected index in `[first, from]`.
    pub(crate) fn prev_from(&self, from: usize, first: usize) -> Option<usize> {
        if from < first {
            return None;
        }
        let start_register = first / REGISTER_WIDTH;
        let mut register = from / REGISTER_WIDTH;
        let mut word = self.global_word(register) & low_bits((from % REGISTER_WIDTH) as u32);
        loop {
            if register == start_register {
                word &= high_bits((first % REGISTER_WIDTH) as u32);
            }
            if word != 0 {
                let top = REGISTER_WIDTH - 1 - word.leading_zeros() as usize;
                return Some(register * REGISTER_WIDTH + top);
            }
            if register == start_register {
                return None;
            }
            register -= 1;
            word = self.global_word(register);
        }
    }

    /// Call `visit` with the slot of every selected bit of `block` within
    /// `span`, in ascending order. Returns the number of hits.
    #[inline]
    pub(crate) fn scan_block(
        &self,
        block: usize,
        span: RegisterSpan,
        mut visit: impl FnMut(usize),
    ) -> usize {
        let mut hits = 0;
        for register in span.first_register..=span.last_register {
            let mut word = self.word(block, register);
            if register == span.first_register {
                word &= high_bits(span.first_bit);
            }
            if register == span.last_register {
                word &= low_bits(span.last_bit);
            }
            while word != 0 {
                let bit = word.trailing_zeros();
                word &= word - 1;
                visit(BlockGeometry::slot_of(register, bit));
                hits += 1;
            }
        }
        hits
    }
}

/// Inclusive (register, bit) bounds within one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RegisterSpan {
    pub(crate) first_register: usize,
    pub(crate) first_bit: u32,
    pub(crate) last_register: usize,
    pub(crate) last_bit: u32,
}

impl RegisterSpan {
    /// Every register of a block.
    pub(crate) fn full(registers_per_block: usize) -> Self {
        Self {
            first_register: 0,
            first_bit: 0,
            last_register: registers_per_block - 1,
            last_bit: (REGISTER_WIDTH - 1) as u32,
        }
    }

    /// Span from `first` to `last` inclusive, both in the same block.
    pub(crate) fn between(first: Position, last: Position) -> Self {
        debug_assert_eq!(first.block, last.block);
        Self {
            first_register: first.register(),
            first_bit: first.bit(),
            last_register: last.register(),
            last_bit: last.bit(),
        }
    }
}

/// Ascending cursor over the selected indices in `[first, last]`.
pub(crate) struct SetBits<'a> {
    selection: Selection<'a>,
    register: usize,
    end_register: usize,
    end_mask: u64,
    word: u64,
}

impl<'a> SetBits<'a> {
    /// Cursor over `bounds` (inclusive); `None` yields nothing.
    pub(crate) fn new(selection: Selection<'a>, bounds: Option<(usize, usize)>) -> Self {
        let Some((first, last)) = bounds else {
            return Self {
                selection,
                register: 0,
                end_register: 0,
                end_mask: 0,
                word: 0,
            };
        };
        let register = first / REGISTER_WIDTH;
        let end_register = last / REGISTER_WIDTH;
        let end_mask = low_bits((last % REGISTER_WIDTH) as u32);
        let mut word = selection.global_word(register) & high_bits((first % REGISTER_WIDTH) as u32);
        if register == end_register {
            word &= end_mask;
        }
        Self {
            selection,
            register,
            end_register,
            end_mask,
            word,
        }
    }
}

impl Iterator for SetBits<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        loop {
            if self.word != 0 {
                let bit = self.word.trailing_zeros() as usize;
                self.word &= self.word - 1;
                return Some(self.register * REGISTER_WIDTH + bit);
            }
            if self.register >= self.end_register {
                return None;
            }
            self.register += 1;
            self.word = self.selection.global_word(self.register);
            if self.register == self.end_register {
                self.word &= self.end_mask;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> BlockGeometry {
        BlockGeometry::new(128)
    }

    fn layer_with(indices: &[usize], blocks: usize) -> BitLayer {
        let g = geometry();
        let mut layer = BitLayer::new(g.registers_per_block(), blocks);
        for &i in indices {
            layer.insert(g.locate(i));
        }
        layer
    }

    #[test]
    fn insert_and_remove_report_changes() {
        let g = geometry();
        let mut layer = BitLayer::new(g.registers_per_block(), 1);
        assert!(layer.insert(g.locate(5)));
        assert!(!layer.insert(g.locate(5)));
        assert!(layer.contains(g.locate(5)));
        assert!(layer.remove(g.locate(5)));
        assert!(!layer.remove(g.locate(5)));
        assert_eq!(layer.count_ones(), 0);
    }

    #[test]
    fn contains_past_last_block_is_false() {
        let layer = layer_with(&[3], 1);
        assert!(!layer.contains(Position::new(7, 3)));
    }

    #[test]
    fn clear_keeps_block_count() {
        let mut layer = layer_with(&[1, 200, 255], 2);
        assert_eq!(layer.count_ones(), 3);
        layer.clear();
        assert_eq!(layer.count_ones(), 0);
        assert_eq!(layer.block_count(), 2);
    }

    #[test]
    fn edge_words() {
        assert_eq!(low_bits(0), 1);
        assert_eq!(low_bits(63), !0);
        assert_eq!(high_bits(0), !0);
        assert_eq!(high_bits(63), 1 << 63);
    }

    #[test]
    fn next_and_prev_cross_registers_and_blocks() {
        let valid = layer_with(&[2, 64, 127, 130, 250], 2);
        let sel = Selection::new(&valid, Filter::All, geometry());
        assert_eq!(sel.next_from(0, 255), Some(2));
        assert_eq!(sel.next_from(3, 255), Some(64));
        assert_eq!(sel.next_from(128, 255), Some(130));
        assert_eq!(sel.next_from(131, 249), None);
        assert_eq!(sel.prev_from(255, 0), Some(250));
        assert_eq!(sel.prev_from(129, 0), Some(127));
        assert_eq!(sel.prev_from(63, 3), None);
    }

    #[test]
    fn masked_and_unmasked_filters() {
        let valid = layer_with(&[1, 2, 3, 4], 1);
        let tag = layer_with(&[2, 4, 9], 1);
        let masked = Selection::new(&valid, Filter::Masked(&tag), geometry());
        let hits: Vec<_> = SetBits::new(masked, Some((0, 127))).collect();
        assert_eq!(hits, vec![2, 4]);

        let unmasked = Selection::new(&valid, Filter::Unmasked(&tag), geometry());
        let hits: Vec<_> = SetBits::new(unmasked, Some((0, 127))).collect();
        assert_eq!(hits, vec![1, 3]);
    }

    #[test]
    fn set_bits_respects_bounds() {
        let valid = layer_with(&[0, 5, 63, 64, 100, 128, 200], 2);
        let sel = Selection::new(&valid, Filter::All, geometry());
        let hits: Vec<_> = SetBits::new(sel, Some((5, 128))).collect();
        assert_eq!(hits, vec![5, 63, 64, 100, 128]);
        assert_eq!(SetBits::new(sel, None).count(), 0);
    }

    #[test]
    fn scan_block_honours_inclusive_span() {
        let valid = layer_with(&[0, 10, 63, 64, 70, 127], 1);
        let sel = Selection::new(&valid, Filter::All, geometry());
        let span = RegisterSpan::between(Position::new(0, 10), Position::new(0, 70));
        let mut seen = Vec::new();
        let hits = sel.scan_block(0, span, |slot| seen.push(slot));
        assert_eq!(seen, vec![10, 63, 64, 70]);
        assert_eq!(hits, 4);

        let full = sel.scan_block(0, RegisterSpan::full(2), |_| {});
        assert_eq!(full, 6);
    }

    #[cfg(not(miri))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeSet;

        proptest! {
            #[test]
            fn set_bits_matches_reference(
                indices in proptest::collection::btree_set(0usize..512, 0..80),
                a in 0usize..512,
                b in 0usize..512,
            ) {
                let (first, last) = (a.min(b), a.max(b));
                let list: Vec<_> = indices.iter().copied().collect();
                let valid = layer_with(&list, 4);
                let sel = Selection::new(&valid, Filter::All, geometry());
                let got: Vec<_> = SetBits::new(sel, Some((first, last))).collect();
                let want: Vec<_> = indices.range(first..=last).copied().collect();
                prop_assert_eq!(got, want);
            }

            #[test]
            fn next_prev_match_reference(
                indices in proptest::collection::btree_set(0usize..512, 0..80),
                from in 0usize..512,
            ) {
                let list: Vec<_> = indices.iter().copied().collect();
                let valid = layer_with(&list, 4);
                let sel = Selection::new(&valid, Filter::All, geometry());
                let set: &BTreeSet<usize> = &indices;
                prop_assert_eq!(sel.next_from(from, 511), set.range(from..).next().copied());
                prop_assert_eq!(sel.prev_from(from, 0), set.range(..=from).next_back().copied());
            }
        }
    }
}
