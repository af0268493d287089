//! Fork-join traversal over blocks.
//!
//! Work is split by block: each rayon task owns one block's slots (or, for
//! the worker-partitioned modes, a contiguous run of blocks), scans the
//! matching registers and calls the closure on every selected slot. Each
//! call receives a distinct `&mut T`, so the closure only needs `Sync`
//! for whatever it captures. There is no ordering across blocks.
//!
//! Runs on the store's dedicated pool when one was configured, otherwise
//! on the rayon global pool.

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::bits::{Filter, RegisterSpan, Selection};
use crate::range::LabeledRange;
use crate::store::EntityStore;
use crate::traits::Tag;

impl<T: Send + Sync, M: Tag, L: Tag> EntityStore<T, M, L> {
    /// Apply `f` to every valid entity in parallel.
    pub fn par_for_each<F>(&mut self, f: F)
    where
        F: Fn(&mut T) + Sync + Send,
    {
        self.par_apply(None, false, &f);
    }

    /// Apply `f` to every valid entity tagged with `tag`, in parallel.
    ///
    /// Does nothing for a tag that was never created.
    pub fn par_for_each_masked<F>(&mut self, tag: M, f: F)
    where
        F: Fn(&mut T) + Sync + Send,
    {
        if self.masks.contains_key(&tag) {
            self.par_apply(Some(tag), false, &f);
        }
    }

    /// Apply `f` to every valid entity NOT tagged with `tag`, in parallel.
    ///
    /// For a tag that was never created this visits every valid entity.
    pub fn par_for_each_unmasked<F>(&mut self, tag: M, f: F)
    where
        F: Fn(&mut T) + Sync + Send,
    {
        if self.masks.contains_key(&tag) {
            self.par_apply(Some(tag), true, &f);
        } else {
            self.par_apply(None, false, &f);
        }
    }

    /// Read-only parallel visit of every valid entity.
    ///
    /// Takes `&self`, so several of these may run at once.
    pub fn par_for_each_ref<F>(&self, f: F)
    where
        F: Fn(&T) + Sync + Send,
    {
        let selection = Selection::new(&self.validity, Filter::All, self.geometry);
        let span = RegisterSpan::full(self.geometry.registers_per_block());
        let blocks = &self.blocks;
        install(self.pool.as_ref(), || {
            blocks.par_iter().enumerate().for_each(|(block, slots)| {
                selection.scan_block(block, span, |slot| f(&slots[slot]));
            });
        });
    }

    /// Apply `f` to entities tagged with `tag` whose index lies in the
    /// range `label`, in parallel. Returns the number of entities visited.
    ///
    /// The range is inclusive of its end index. Returns 0 for a tag that
    /// was never created.
    ///
    /// # Panics
    ///
    /// Panics if no range is defined under `label`.
    pub fn par_for_each_in_range<F>(&mut self, label: L, tag: M, f: F) -> usize
    where
        F: Fn(&mut T) + Sync + Send,
    {
        let range = self.range_checked(label);
        let Some(mask) = self.masks.get(&tag) else {
            return 0;
        };
        let selection = Selection::new(&self.validity, Filter::Masked(&mask.bits), self.geometry);
        let registers = self.geometry.registers_per_block();
        let covered = range.blocks(self.blocks.len());
        let first_block = covered.start;
        let blocks = &mut self.blocks[covered];
        install(self.pool.as_ref(), || {
            visit_range(blocks, first_block, &range, registers, selection, &f)
        })
    }

    /// Apply `f(worker_id, entity)` to every valid entity tagged with `tag`.
    ///
    /// Blocks are split into at most [`worker_count`](Self::worker_count)
    /// contiguous runs and worker `w` handles run `w`, so callers can keep
    /// per-worker partial results indexed by `worker_id` and merge them
    /// afterwards.
    pub fn par_for_each_with_worker_id<F>(&mut self, tag: M, f: F)
    where
        F: Fn(usize, &mut T) + Sync + Send,
    {
        self.par_fold_by_worker(tag, || (), |worker, _, item| f(worker, item));
    }

    /// Map-reduce over entities tagged with `tag`.
    ///
    /// Each worker folds its run of blocks into its own accumulator built
    /// by `init`; the result holds one accumulator per worker (exactly
    /// [`worker_count`](Self::worker_count) of them, untouched ones
    /// included) in worker order. No locking happens inside the loop.
    pub fn par_fold_by_worker<A, I, F>(&mut self, tag: M, init: I, f: F) -> Vec<A>
    where
        A: Send,
        I: Fn() -> A + Sync + Send,
        F: Fn(usize, &mut A, &mut T) + Sync + Send,
    {
        let workers = self.worker_count();
        let mut partials = match self.masks.get(&tag) {
            Some(mask) => {
                let selection =
                    Selection::new(&self.validity, Filter::Masked(&mask.bits), self.geometry);
                let span = RegisterSpan::full(self.geometry.registers_per_block());
                let per_worker = self.blocks.len().div_ceil(workers).max(1);
                let blocks = &mut self.blocks;
                install(self.pool.as_ref(), || {
                    blocks
                        .par_chunks_mut(per_worker)
                        .enumerate()
                        .map(|(worker, run)| {
                            let mut acc = init();
                            for (offset, slots) in run.iter_mut().enumerate() {
                                let block = worker * per_worker + offset;
                                selection.scan_block(block, span, |slot| {
                                    f(worker, &mut acc, &mut slots[slot])
                                });
                            }
                            acc
                        })
                        .collect::<Vec<A>>()
                })
            }
            None => Vec::with_capacity(workers),
        };
        while partials.len() < workers {
            partials.push(init());
        }
        partials
    }

    fn par_apply<F>(&mut self, tag: Option<M>, invert: bool, f: &F) -> usize
    where
        F: Fn(&mut T) + Sync + Send,
    {
        let filter = match tag.and_then(|t| self.masks.get(&t)) {
            Some(mask) if invert => Filter::Unmasked(&mask.bits),
            Some(mask) => Filter::Masked(&mask.bits),
            None => Filter::All,
        };
        let selection = Selection::new(&self.validity, filter, self.geometry);
        let span = RegisterSpan::full(self.geometry.registers_per_block());
        let blocks = &mut self.blocks;
        install(self.pool.as_ref(), || {
            blocks
                .par_iter_mut()
                .enumerate()
                .map(|(block, slots)| selection.scan_block(block, span, |slot| f(&mut slots[slot])))
                .sum::<usize>()
        })
    }
}

fn visit_range<T, F>(
    blocks: &mut [Box<[T]>],
    first_block: usize,
    range: &LabeledRange,
    registers: usize,
    selection: Selection<'_>,
    f: &F,
) -> usize
where
    T: Send,
    F: Fn(&mut T) + Sync + Send,
{
    blocks
        .par_iter_mut()
        .enumerate()
        .map(|(offset, slots)| {
            let block = first_block + offset;
            let span = range.span_in(block, registers);
            selection.scan_block(block, span, |slot| f(&mut slots[slot]))
        })
        .sum()
}

/// Run `op` on `pool`, or on the current (global) pool.
fn install<R, OP>(pool: Option<&ThreadPool>, op: OP) -> R
where
    R: Send,
    OP: FnOnce() -> R + Send,
{
    match pool {
        Some(pool) => pool.install(op),
        None => op(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::{EntityStore, StoreConfig};

    #[derive(Default)]
    struct Agent {
        id: usize,
        visits: u32,
    }

    type Store = EntityStore<Agent, char>;

    fn populated(n: usize, workers: Option<usize>) -> Store {
        let mut config = StoreConfig::new(64);
        config.worker_count = workers;
        let mut store = Store::with_config(config).unwrap();
        store.create_mask('T');
        for id in 0..n {
            let i = store.insert(Agent { id, visits: 0 });
            if id % 3 == 0 {
                store.set('T', i);
            }
        }
        store
    }

    fn visits(store: &Store) -> Vec<u32> {
        store.iter().map(|(_, a)| a.visits).collect()
    }

    #[test]
    fn par_for_each_visits_every_valid_once() {
        let mut store = populated(1000, Some(4));
        store.mark_invalid(500);
        store.par_for_each(|a| a.visits += 1);
        assert!(visits(&store).iter().all(|&v| v == 1));
        assert_eq!(store.get(500).visits, 0);
    }

    #[test]
    fn par_for_each_masked_visits_intersection() {
        let mut store = populated(1000, Some(3));
        store.par_for_each_masked('T', |a| a.visits += 1);
        for (_, a) in store.iter() {
            assert_eq!(a.visits, u32::from(a.id % 3 == 0));
        }
    }

    #[test]
    fn par_for_each_unmasked_visits_complement() {
        let mut store = populated(1000, Some(2));
        store.par_for_each_unmasked('T', |a| a.visits += 1);
        for (_, a) in store.iter() {
            assert_eq!(a.visits, u32::from(a.id % 3 != 0));
        }
        store.par_for_each_unmasked('?', |a| a.visits += 10);
        assert!(visits(&store).iter().all(|&v| v >= 10));
    }

    #[test]
    fn par_for_each_ref_reads_concurrently() {
        let store = populated(700, None);
        let total = AtomicUsize::new(0);
        store.par_for_each_ref(|a| {
            total.fetch_add(a.id, Ordering::Relaxed);
        });
        assert_eq!(total.into_inner(), (0..700).sum::<usize>());
    }

    #[test]
    fn empty_store_runs_no_closures() {
        let mut store = populated(0, Some(2));
        let calls = AtomicUsize::new(0);
        store.par_for_each(|_| {
            calls.fetch_add(1, Ordering::Relaxed);
        });
        store.par_for_each_masked('T', |_| {
            calls.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(calls.into_inner(), 0);
    }

    #[test]
    fn range_traversal_is_inclusive() {
        let mut store = populated(400, Some(4));
        store.create_mask('A');
        for i in 0..400 {
            store.set('A', i);
        }
        store.define_range('r', 63, 130).unwrap();
        let seen = Mutex::new(Vec::new());
        let matched = store.par_for_each_in_range('r', 'A', |a| seen.lock().unwrap().push(a.id));
        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(matched, 68);
        assert_eq!(seen, (63..=130).collect::<Vec<_>>());
    }

    #[test]
    fn range_past_arena_is_clamped() {
        let mut store = populated(100, Some(2));
        store.define_range('r', 90, 1_000_000).unwrap();
        let matched = store.par_for_each_in_range('r', 'T', |a| a.visits += 1);
        assert_eq!(matched, (90..100).filter(|id| id % 3 == 0).count());

        store.define_range('f', 5000, 6000).unwrap();
        assert_eq!(store.par_for_each_in_range('f', 'T', |_| {}), 0);
    }

    #[test]
    #[should_panic(expected = "no range labeled")]
    fn unknown_range_panics() {
        let mut store = populated(10, None);
        store.par_for_each_in_range('x', 'T', |_| {});
    }

    #[test]
    fn worker_ids_partition_blocks() {
        let mut store = populated(64 * 10, Some(4));
        assert_eq!(store.worker_count(), 4);
        let hits: Vec<AtomicUsize> = (0..4).map(|_| AtomicUsize::new(0)).collect();
        store.par_for_each_with_worker_id('T', |worker, a| {
            assert!(worker < 4);
            a.visits += 1;
            hits[worker].fetch_add(1, Ordering::Relaxed);
        });
        let total: usize = hits.iter().map(|h| h.load(Ordering::Relaxed)).sum();
        assert_eq!(total, store.count_masked('T'));
    }

    #[test]
    fn fold_by_worker_merges_to_mask_count() {
        let mut store = populated(1000, Some(3));
        let partials = store.par_fold_by_worker('T', || 0usize, |_, acc, _| *acc += 1);
        assert_eq!(partials.len(), 3);
        assert_eq!(partials.iter().sum::<usize>(), store.count_masked('T'));

        let untouched = store.par_fold_by_worker('?', || 7u32, |_, acc, _| *acc += 1);
        assert_eq!(untouched, vec![7, 7, 7]);
    }

    #[test]
    fn global_pool_fallback_works() {
        let mut store = populated(300, None);
        let partials = store.par_fold_by_worker('T', Vec::new, |w, acc, a| acc.push((w, a.id)));
        assert_eq!(partials.len(), store.worker_count());
        let mut ids: Vec<_> = partials.into_iter().flatten().map(|(_, id)| id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..300).filter(|id| id % 3 == 0).collect::<Vec<_>>());
    }
}
