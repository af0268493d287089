//! Labeled sub-intervals of the index space.
//!
//! A [`LabeledRange`] is a closed interval `[begin, end]` whose block and
//! register coordinates are computed once at definition time, so range
//! traversal jumps straight to the first covered block instead of
//! re-deriving coordinates per item. Ranges carry no liveness; traversal
//! intersects them with the validity layer and a user mask.

use crate::bits::RegisterSpan;
use crate::error::StoreError;
use crate::position::{BlockGeometry, Position};

/// A closed interval of slot indices with precomputed coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabeledRange {
    begin: usize,
    end: usize,
    first: Position,
    last: Position,
}

impl LabeledRange {
    /// Build the range `[begin, end]` for blocks of the given geometry.
    ///
    /// `end` must be below `usize::MAX` so the inclusive length fits.
    pub fn new(begin: usize, end: usize, geometry: BlockGeometry) -> Result<Self, StoreError> {
        if begin > end || end == usize::MAX {
            return Err(StoreError::InvalidRange { begin, end });
        }
        Ok(Self {
            begin,
            end,
            first: geometry.locate(begin),
            last: geometry.locate(end),
        })
    }

    /// First index covered.
    pub fn begin(&self) -> usize {
        self.begin
    }

    /// Last index covered (inclusive).
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of indices covered: `end - begin + 1`.
    pub fn len(&self) -> usize {
        self.end - self.begin + 1
    }

    /// Always `false`: a range covers at least one index.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Position of `begin`.
    pub fn first_position(&self) -> Position {
        self.first
    }

    /// Position of `end`.
    pub fn last_position(&self) -> Position {
        self.last
    }

    /// Whether `index` lies inside the range.
    pub fn contains(&self, index: usize) -> bool {
        (self.begin..=self.end).contains(&index)
    }

    /// Blocks covered by the range, clamped to `block_count` existing
    /// blocks. Empty when the range starts past the arena.
    pub(crate) fn blocks(&self, block_count: usize) -> std::ops::Range<usize> {
        let start = self.first.block.min(block_count);
        let stop = (self.last.block + 1).min(block_count);
        start..stop
    }

    /// Register span the range covers within `block`.
    pub(crate) fn span_in(&self, block: usize, registers_per_block: usize) -> RegisterSpan {
        let full = RegisterSpan::full(registers_per_block);
        let mut span = full;
        if block == self.first.block {
            span.first_register = self.first.register();
            span.first_bit = self.first.bit();
        }
        if block == self.last.block {
            span.last_register = self.last.register();
            span.last_bit = self.last.bit();
        }
        span
    }
}
