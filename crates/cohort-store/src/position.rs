//! Conversions between linear indices and block coordinates.
//!
//! Every slot has a permanent linear index. Storage is addressed by
//! [`Position`] (block, slot), and mask bits by (register, bit) within a
//! block. All of that arithmetic lives here so callers never inline shifts.

use std::fmt;

/// Width of a mask register in bits.
pub const REGISTER_WIDTH: usize = u64::BITS as usize;

/// Location of a slot within the arena.
///
/// Ordered lexicographically: by block, then by slot. Because every block
/// holds the same number of slots this order matches linear index order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    /// Index of the block holding the slot.
    pub block: usize,
    /// Offset of the slot within its block.
    pub slot: usize,
}

impl Position {
    /// Create a position from block and slot coordinates.
    pub fn new(block: usize, slot: usize) -> Self {
        Self { block, slot }
    }

    /// Register within the block holding this slot's mask bit.
    pub fn register(self) -> usize {
        self.slot / REGISTER_WIDTH
    }

    /// Bit offset of this slot within its register.
    pub fn bit(self) -> u32 {
        (self.slot % REGISTER_WIDTH) as u32
    }

    /// Single-bit word selecting this slot within its register.
    pub fn bit_mask(self) -> u64 {
        1u64 << self.bit()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.block, self.slot)
    }
}

/// Block sizing of one store, fixed at construction.
///
/// `block_capacity` is a power of two and a multiple of
/// [`REGISTER_WIDTH`], so a linear index maps onto a flat register space:
/// register `index / 64` holds bit `index % 64`, and that register belongs
/// to block `register / registers_per_block`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockGeometry {
    block_capacity: usize,
    registers_per_block: usize,
}

impl BlockGeometry {
    /// Geometry for blocks of `block_capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `block_capacity` is not a power of two of at least 64.
    /// Configs are validated before reaching this point.
    pub fn new(block_capacity: usize) -> Self {
        assert!(
            block_capacity >= REGISTER_WIDTH && block_capacity.is_power_of_two(),
            "block capacity {block_capacity} must be a power of two and at least {REGISTER_WIDTH}"
        );
        Self {
            block_capacity,
            registers_per_block: block_capacity / REGISTER_WIDTH,
        }
    }

    /// Slots per block.
    pub fn block_capacity(&self) -> usize {
        self.block_capacity
    }

    /// Registers per block.
    pub fn registers_per_block(&self) -> usize {
        self.registers_per_block
    }

    /// Convert a linear index to (block, slot).
    pub fn locate(&self, index: usize) -> Position {
        Position {
            block: index / self.block_capacity,
            slot: index % self.block_capacity,
        }
    }

    /// Convert (block, slot) back to a linear index.
    pub fn index_of(&self, pos: Position) -> usize {
        pos.block * self.block_capacity + pos.slot
    }

    /// Split a flat register number into (block, register-within-block).
    pub fn split_register(&self, global_register: usize) -> (usize, usize) {
        (
            global_register / self.registers_per_block,
            global_register % self.registers_per_block,
        )
    }

    /// Slot within its block for `register`/`bit` coordinates.
    pub fn slot_of(register: usize, bit: u32) -> usize {
        register * REGISTER_WIDTH + bit as usize
    }
}
