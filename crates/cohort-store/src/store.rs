//! The block-allocated entity store.
//!
//! [`EntityStore`] owns an append-only list of fixed-capacity blocks. Each
//! block is a boxed slice that is never moved or resized once pushed, so a
//! slot's address is stable for the life of the store. Occupancy is
//! tracked by bit layers rather than by the slots themselves:
//!
//! ```text
//! EntityStore
//! ├── blocks:   Vec<Box<[T]>>            (C slots each, default-initialised)
//! ├── validity: BitLayer                 (slot holds a live entity)
//! ├── reserved: BitLayer                 (handed out, not yet validated)
//! ├── free:     VecDeque<Position>       (slots available for allocation)
//! ├── masks:    IndexMap<M, UserMask>    (tag layers + live counts)
//! └── ranges:   IndexMap<L, LabeledRange>
//! ```
//!
//! A slot cycles free → reserved → valid → free. Every position created by
//! growth is in exactly one of those three states.

use std::collections::VecDeque;

use indexmap::IndexMap;
use rayon::ThreadPool;

use crate::bits::{BitLayer, Filter, Selection};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::position::{BlockGeometry, Position};
use crate::range::LabeledRange;
use crate::traits::Tag;

/// A tag layer and the number of valid slots it marks.
#[derive(Clone, Debug)]
pub(crate) struct UserMask {
    pub(crate) bits: BitLayer,
    pub(crate) count: usize,
}

/// Never-shrinking, address-stable container for simulation entities.
///
/// `T` is the entity record, `M` names user masks, and `L` names labeled
/// ranges (defaults to the mask tag type).
///
/// All mutation takes `&mut self`, so allocation, growth, lifecycle
/// changes and mask edits are exclusive with each other and with any
/// traversal. Read-only traversals take `&self` and may overlap.
///
/// # Panics
///
/// Lifecycle misuse is a caller bug, not a recoverable condition. The
/// following panic with a message naming the index:
/// - `get`/`get_mut` past the grown index space,
/// - `mark_valid` on a slot not handed out by [`allocate_slot`](Self::allocate_slot),
/// - `mark_invalid`, `set`, `clear` or `is_set` on a slot that is not valid,
/// - `set`, `clear` or `clear_all` on a mask that was never created,
/// - range traversal or `range_size` with an undefined label.
pub struct EntityStore<T, M, L = M> {
    pub(crate) config: StoreConfig,
    pub(crate) geometry: BlockGeometry,
    pub(crate) blocks: Vec<Box<[T]>>,
    pub(crate) validity: BitLayer,
    reserved: BitLayer,
    free_slots: VecDeque<Position>,
    pub(crate) masks: IndexMap<M, UserMask>,
    pub(crate) ranges: IndexMap<L, LabeledRange>,
    live: usize,
    bounds: Option<(Position, Position)>,
    pub(crate) pool: Option<ThreadPool>,
}

impl<T: Default, M: Tag, L: Tag> EntityStore<T, M, L> {
    /// Create a store with the default configuration on the global pool.
    pub fn new() -> Self {
        Self::build(StoreConfig::default(), None)
    }

    /// Create a store from an explicit configuration.
    ///
    /// Builds a dedicated worker pool when `config.worker_count` is set.
    pub fn with_config(config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let pool = match config.worker_count {
            Some(_) => {
                let threads = config.resolved_worker_count();
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("cohort-worker-{i}"))
                    .build()
                    .map_err(|e| StoreError::ThreadPool {
                        reason: e.to_string(),
                    })?;
                log::debug!("entity store built a dedicated pool of {threads} workers");
                Some(pool)
            }
            None => None,
        };
        Ok(Self::build(config, pool))
    }

    fn build(config: StoreConfig, pool: Option<ThreadPool>) -> Self {
        let geometry = BlockGeometry::new(config.block_capacity);
        let registers = geometry.registers_per_block();
        let mut store = Self {
            config,
            geometry,
            blocks: Vec::new(),
            validity: BitLayer::new(registers, 0),
            reserved: BitLayer::new(registers, 0),
            free_slots: VecDeque::new(),
            masks: IndexMap::new(),
            ranges: IndexMap::new(),
            live: 0,
            bounds: None,
            pool,
        };
        store.grow();
        store
    }

    /// Hand out a free slot index, growing by one block if none is left.
    ///
    /// The slot holds either a default value (fresh block) or whatever its
    /// previous occupant left behind; initialise it through
    /// [`get_mut`](Self::get_mut) before calling [`mark_valid`](Self::mark_valid).
    pub fn allocate_slot(&mut self) -> usize {
        if self.free_slots.is_empty() {
            self.grow();
        }
        let pos = self
            .free_slots
            .pop_front()
            .expect("growth enqueues a full block of free slots");
        self.reserved.insert(pos);
        self.geometry.index_of(pos)
    }

    /// Allocate a slot, store `value` in it and mark it valid.
    pub fn insert(&mut self, value: T) -> usize {
        let index = self.allocate_slot();
        *self.get_mut(index) = value;
        self.mark_valid(index);
        index
    }

    /// Append one block and extend every layer in lock-step.
    fn grow(&mut self) {
        let capacity = self.geometry.block_capacity();
        let block: Box<[T]> = (0..capacity).map(|_| T::default()).collect();
        let block_index = self.blocks.len();
        self.blocks.push(block);
        self.validity.push_block();
        self.reserved.push_block();
        for mask in self.masks.values_mut() {
            mask.bits.push_block();
            debug_assert_eq!(mask.bits.block_count(), self.blocks.len());
        }
        self.free_slots
            .extend((0..capacity).map(|slot| Position::new(block_index, slot)));
        log::debug!(
            "entity store grew to {} blocks ({} slots)",
            self.blocks.len(),
            self.index_capacity()
        );
    }
}

impl<T: Default, M: Tag, L: Tag> Default for EntityStore<T, M, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, M: Tag, L: Tag> EntityStore<T, M, L> {
    // ── slot access ────────────────────────────────────────────────

    /// Shared reference to the slot at `index`, valid or not.
    pub fn get(&self, index: usize) -> &T {
        let pos = self.locate_checked(index);
        &self.blocks[pos.block][pos.slot]
    }

    /// Mutable reference to the slot at `index`, valid or not.
    pub fn get_mut(&mut self, index: usize) -> &mut T {
        let pos = self.locate_checked(index);
        &mut self.blocks[pos.block][pos.slot]
    }

    /// The entity at `index`, or `None` if the slot is not currently valid.
    pub fn try_get(&self, index: usize) -> Option<&T> {
        let pos = self.geometry.locate(index);
        self.validity
            .contains(pos)
            .then(|| &self.blocks[pos.block][pos.slot])
    }

    /// Mutable entity at `index`, or `None` if the slot is not valid.
    pub fn try_get_mut(&mut self, index: usize) -> Option<&mut T> {
        let pos = self.geometry.locate(index);
        if self.validity.contains(pos) {
            Some(&mut self.blocks[pos.block][pos.slot])
        } else {
            None
        }
    }

    // ── lifecycle ──────────────────────────────────────────────────

    /// Mark a freshly allocated slot as holding a live entity.
    pub fn mark_valid(&mut self, index: usize) {
        let pos = self.locate_checked(index);
        assert!(
            self.reserved.remove(pos),
            "mark_valid: index {index} was not handed out by allocate_slot"
        );
        self.validity.insert(pos);
        self.live += 1;
        self.bounds = Some(match self.bounds {
            None => (pos, pos),
            Some((first, last)) => (first.min(pos), last.max(pos)),
        });
    }

    /// Retire the entity at `index` and recycle its slot.
    ///
    /// Clears the slot's bit in every user mask, so mask counts keep
    /// matching the valid population. The slot is reused by the next
    /// [`allocate_slot`](Self::allocate_slot).
    pub fn mark_invalid(&mut self, index: usize) {
        let pos = self.locate_checked(index);
        assert!(
            self.validity.remove(pos),
            "mark_invalid: index {index} is not valid"
        );
        self.live -= 1;
        for mask in self.masks.values_mut() {
            if mask.bits.remove(pos) {
                mask.count -= 1;
            }
        }
        self.free_slots.push_front(pos);
        self.bounds = self.bounds_after_retiring(pos);
    }

    /// Retire the entity at `index`. Same as [`mark_invalid`](Self::mark_invalid).
    pub fn remove(&mut self, index: usize) {
        self.mark_invalid(index);
    }

    fn bounds_after_retiring(&self, pos: Position) -> Option<(Position, Position)> {
        let (first, last) = self.bounds?;
        if self.live == 0 {
            return None;
        }
        let selection = Selection::new(&self.validity, Filter::All, self.geometry);
        let index = self.geometry.index_of(pos);
        let first_index = self.geometry.index_of(first);
        let last_index = self.geometry.index_of(last);
        let first = if pos == first {
            self.geometry.locate(selection.next_from(index + 1, last_index)?)
        } else {
            first
        };
        let last = if pos == last {
            self.geometry.locate(selection.prev_from(index - 1, first_index)?)
        } else {
            last
        };
        Some((first, last))
    }

    /// Whether the slot at `index` holds a live entity.
    pub fn is_valid(&self, index: usize) -> bool {
        self.validity.contains(self.geometry.locate(index))
    }

    /// Reorder the free-slot queue so the lowest indices are reused first.
    pub fn sort_free_slots(&mut self) {
        self.free_slots.make_contiguous().sort_unstable();
        log::debug!("sorted {} free slots", self.free_slots.len());
    }

    // ── sizing ─────────────────────────────────────────────────────

    /// Number of valid entities.
    pub fn count(&self) -> usize {
        self.live
    }

    /// Whether the store holds no valid entity.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Size of the grown index space (`blocks × block_capacity`).
    pub fn index_capacity(&self) -> usize {
        self.blocks.len() * self.geometry.block_capacity()
    }

    /// Number of allocated blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of slots waiting in the free-slot queue.
    pub fn free_slot_count(&self) -> usize {
        self.free_slots.len()
    }

    /// Lowest valid index.
    pub fn first_index(&self) -> Option<usize> {
        self.bounds.map(|(first, _)| self.geometry.index_of(first))
    }

    /// Highest valid index.
    pub fn last_index(&self) -> Option<usize> {
        self.bounds.map(|(_, last)| self.geometry.index_of(last))
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Block sizing of this store.
    pub fn geometry(&self) -> BlockGeometry {
        self.geometry
    }

    /// Number of workers the parallel traversals split work across.
    pub fn worker_count(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    // ── user masks ─────────────────────────────────────────────────

    /// Register a user mask. Does nothing if `tag` already exists.
    pub fn create_mask(&mut self, tag: M) {
        if self.masks.contains_key(&tag) {
            return;
        }
        let bits = BitLayer::new(self.geometry.registers_per_block(), self.blocks.len());
        self.masks.insert(tag, UserMask { bits, count: 0 });
        log::trace!("created mask {tag:?}");
    }

    /// Whether a mask named `tag` exists.
    pub fn has_mask(&self, tag: M) -> bool {
        self.masks.contains_key(&tag)
    }

    /// Tags of all masks, in creation order.
    pub fn mask_tags(&self) -> impl Iterator<Item = M> + '_ {
        self.masks.keys().copied()
    }

    /// Tag the valid entity at `index` with `tag`.
    pub fn set(&mut self, tag: M, index: usize) {
        let pos = self.valid_position(index, "set");
        let mask = self.mask_mut(tag);
        if mask.bits.insert(pos) {
            mask.count += 1;
        }
    }

    /// Remove `tag` from the valid entity at `index`.
    pub fn clear(&mut self, tag: M, index: usize) {
        let pos = self.valid_position(index, "clear");
        let mask = self.mask_mut(tag);
        if mask.bits.remove(pos) {
            mask.count -= 1;
        }
    }

    /// Remove `tag` from every entity. Other masks are untouched.
    pub fn clear_all(&mut self, tag: M) {
        let mask = self.mask_mut(tag);
        mask.bits.clear();
        mask.count = 0;
    }

    /// Number of valid entities tagged with `tag` (0 if never created).
    pub fn count_masked(&self, tag: M) -> usize {
        self.masks.get(&tag).map_or(0, |mask| mask.count)
    }

    /// Whether the valid entity at `index` carries `tag`.
    pub fn is_set(&self, tag: M, index: usize) -> bool {
        let pos = self.valid_position(index, "is_set");
        self.masks
            .get(&tag)
            .is_some_and(|mask| mask.bits.contains(pos))
    }

    fn mask_mut(&mut self, tag: M) -> &mut UserMask {
        match self.masks.get_mut(&tag) {
            Some(mask) => mask,
            None => panic!("no mask {tag:?}; call create_mask first"),
        }
    }

    // ── labeled ranges ─────────────────────────────────────────────

    /// Define (or replace) the closed range `[begin, end]` under `label`.
    ///
    /// The range may extend past the current index space; traversal only
    /// visits blocks that exist.
    pub fn define_range(&mut self, label: L, begin: usize, end: usize) -> Result<(), StoreError> {
        let range = LabeledRange::new(begin, end, self.geometry)?;
        self.ranges.insert(label, range);
        log::trace!("defined range {label:?} = [{begin}, {end}]");
        Ok(())
    }

    /// The range defined under `label`.
    pub fn range(&self, label: L) -> Option<&LabeledRange> {
        self.ranges.get(&label)
    }

    /// Number of indices covered by `label`: `end - begin + 1`.
    pub fn range_size(&self, label: L) -> usize {
        self.range_checked(label).len()
    }

    pub(crate) fn range_checked(&self, label: L) -> LabeledRange {
        match self.ranges.get(&label) {
            Some(range) => *range,
            None => panic!("no range labeled {label:?}"),
        }
    }

    // ── helpers ────────────────────────────────────────────────────

    pub(crate) fn index_bounds(&self) -> Option<(usize, usize)> {
        self.bounds
            .map(|(first, last)| (self.geometry.index_of(first), self.geometry.index_of(last)))
    }

    fn locate_checked(&self, index: usize) -> Position {
        let capacity = self.index_capacity();
        assert!(
            index < capacity,
            "index {index} out of range for index space of {capacity} slots"
        );
        self.geometry.locate(index)
    }

    fn valid_position(&self, index: usize, op: &str) -> Position {
        let pos = self.locate_checked(index);
        assert!(self.validity.contains(pos), "{op}: index {index} is not valid");
        pos
    }

    /// Recount every layer from its bits. Test support for the count
    /// invariants.
    #[cfg(test)]
    pub(crate) fn recount(&self) -> (usize, Vec<(M, usize)>) {
        let masks = self
            .masks
            .iter()
            .map(|(tag, mask)| (*tag, mask.bits.count_ones()))
            .collect();
        (self.validity.count_ones(), masks)
    }
}
