//! Sequential traversal in ascending index order.
//!
//! Cursors start at the cached first valid index and stop at the cached
//! last one, testing 64 slots per register load.

use crate::bits::{Filter, Selection, SetBits};
use crate::position::BlockGeometry;
use crate::store::EntityStore;
use crate::traits::Tag;

/// Iterator over `(index, &entity)` pairs, ascending by index.
///
/// Created by [`EntityStore::iter`] and [`EntityStore::iter_masked`].
pub struct Iter<'a, T> {
    blocks: &'a [Box<[T]>],
    geometry: BlockGeometry,
    bits: SetBits<'a>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.bits.next()?;
        let pos = self.geometry.locate(index);
        Some((index, &self.blocks[pos.block][pos.slot]))
    }
}

impl<T, M: Tag, L: Tag> EntityStore<T, M, L> {
    /// Iterate over every valid entity.
    pub fn iter(&self) -> Iter<'_, T> {
        self.iter_with(Filter::All, self.index_bounds())
    }

    /// Iterate over valid entities tagged with `tag`.
    ///
    /// Yields nothing for a tag that was never created.
    pub fn iter_masked(&self, tag: M) -> Iter<'_, T> {
        match self.masks.get(&tag) {
            Some(mask) => self.iter_with(Filter::Masked(&mask.bits), self.index_bounds()),
            None => self.iter_with(Filter::All, None),
        }
    }

    fn iter_with<'a>(&'a self, filter: Filter<'a>, bounds: Option<(usize, usize)>) -> Iter<'a, T> {
        let selection = Selection::new(&self.validity, filter, self.geometry);
        Iter {
            blocks: &self.blocks,
            geometry: self.geometry,
            bits: SetBits::new(selection, bounds),
        }
    }

    /// Apply `f` to every valid entity in ascending index order.
    pub fn for_each(&mut self, f: impl FnMut(&mut T)) {
        let bounds = self.index_bounds();
        let selection = Selection::new(&self.validity, Filter::All, self.geometry);
        visit_mut(&mut self.blocks, self.geometry, SetBits::new(selection, bounds), f);
    }

    /// Apply `f` to every valid entity tagged with `tag`, ascending.
    pub fn for_each_masked(&mut self, tag: M, f: impl FnMut(&mut T)) {
        let bounds = self.index_bounds();
        let Some(mask) = self.masks.get(&tag) else {
            return;
        };
        let selection = Selection::new(&self.validity, Filter::Masked(&mask.bits), self.geometry);
        visit_mut(&mut self.blocks, self.geometry, SetBits::new(selection, bounds), f);
    }
}

fn visit_mut<T>(
    blocks: &mut [Box<[T]>],
    geometry: BlockGeometry,
    indices: SetBits<'_>,
    mut f: impl FnMut(&mut T),
) {
    for index in indices {
        let pos = geometry.locate(index);
        f(&mut blocks[pos.block][pos.slot]);
    }
}

impl<'a, T, M: Tag, L: Tag> IntoIterator for &'a EntityStore<T, M, L> {
    type Item = (usize, &'a T);
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
