//! Test utilities and fixture types for cohort development.
//!
//! Provides fixture entities ([`Agent`], [`Place`]), a
//! [`PopulationBuilder`] for constructing populated stores, a brute-force
//! [`ReferenceModel`] to check a store against, and a seeded [`Churn`]
//! driver that applies random lifecycle and mask operations to both.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::collections::{BTreeMap, BTreeSet};

use cohort_store::{EntityStore, StoreConfig};
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub use fixtures::{Agent, Place, Region, Status};

/// Agent store keyed by [`Status`] masks and [`Region`] ranges.
pub type AgentStore = EntityStore<Agent, Status, Region>;

/// Deterministic age for the agent at `id`.
pub fn age_for(id: usize) -> u8 {
    (id * 7 % 90) as u8
}

/// Builder for agent stores with a known population.
///
/// Agents are inserted in index order with `Agent { id, age: age_for(id) }`.
pub struct PopulationBuilder {
    size: usize,
    config: StoreConfig,
    tag_school_age: bool,
    ranges: Vec<(Region, usize, usize)>,
}

impl PopulationBuilder {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            config: StoreConfig::default(),
            tag_school_age: false,
            ranges: Vec::new(),
        }
    }

    pub fn block_capacity(mut self, capacity: usize) -> Self {
        self.config.block_capacity = capacity;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.worker_count = Some(workers);
        self
    }

    /// Create every [`Status`] mask and tag school-age agents.
    pub fn tag_school_age(mut self) -> Self {
        self.tag_school_age = true;
        self
    }

    /// Define a labeled range before any agent is inserted.
    pub fn range(mut self, region: Region, begin: usize, end: usize) -> Self {
        self.ranges.push((region, begin, end));
        self
    }

    pub fn build(self) -> AgentStore {
        let mut store = AgentStore::with_config(self.config).expect("fixture config is valid");
        for (region, begin, end) in self.ranges {
            store
                .define_range(region, begin, end)
                .expect("fixture range is valid");
        }
        if self.tag_school_age {
            for status in Status::ALL {
                store.create_mask(status);
            }
        }
        for id in 0..self.size {
            let index = store.insert(Agent::new(id, age_for(id)));
            assert_eq!(index, id, "fresh store hands out ascending indices");
            if self.tag_school_age && store.get(index).is_school_age() {
                store.set(Status::SchoolAge, index);
            }
        }
        store
    }
}

/// Brute-force model of a store's live set and masks.
///
/// Mirrors every operation applied to a store through plain ordered sets,
/// then [`assert_matches`](ReferenceModel::assert_matches) compares the two.
#[derive(Clone, Debug, Default)]
pub struct ReferenceModel {
    live: BTreeSet<usize>,
    masks: BTreeMap<Status, BTreeSet<usize>>,
}

impl ReferenceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model of a store freshly built by [`PopulationBuilder`].
    pub fn of(store: &AgentStore) -> Self {
        let mut model = Self::new();
        for (index, _) in store.iter() {
            model.live.insert(index);
        }
        for tag in store.mask_tags() {
            let set = store.iter_masked(tag).map(|(i, _)| i).collect();
            model.masks.insert(tag, set);
        }
        model
    }

    pub fn insert(&mut self, index: usize) {
        self.live.insert(index);
    }

    pub fn retire(&mut self, index: usize) {
        self.live.remove(&index);
        for set in self.masks.values_mut() {
            set.remove(&index);
        }
    }

    pub fn set(&mut self, tag: Status, index: usize) {
        self.masks.entry(tag).or_default().insert(index);
    }

    pub fn clear(&mut self, tag: Status, index: usize) {
        self.masks.entry(tag).or_default().remove(&index);
    }

    pub fn clear_all(&mut self, tag: Status) {
        self.masks.entry(tag).or_default().clear();
    }

    pub fn live(&self) -> &BTreeSet<usize> {
        &self.live
    }

    pub fn masked(&self, tag: Status) -> Vec<usize> {
        self.masks
            .get(&tag)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Panic unless `store` holds exactly the modelled live set and masks.
    pub fn assert_matches(&self, store: &AgentStore) {
        assert_eq!(store.count(), self.live.len(), "live count");
        let live: Vec<usize> = store.iter().map(|(i, _)| i).collect();
        assert_eq!(live, self.live.iter().copied().collect::<Vec<_>>(), "live set");
        assert_eq!(store.first_index(), self.live.first().copied(), "first bound");
        assert_eq!(store.last_index(), self.live.last().copied(), "last bound");
        for tag in Status::ALL {
            let want = self.masked(tag);
            assert_eq!(store.count_masked(tag), want.len(), "count of {tag:?}");
            let got: Vec<usize> = store.iter_masked(tag).map(|(i, _)| i).collect();
            assert_eq!(got, want, "members of {tag:?}");
        }
    }
}

/// Seeded random driver of lifecycle and mask operations.
///
/// Each step picks one of insert, retire, tag, untag or clear-all and
/// applies it to a store and its [`ReferenceModel`] alike. The same seed
/// always produces the same operation sequence.
pub struct Churn {
    rng: ChaCha8Rng,
    next_id: usize,
}

impl Churn {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_id: 0,
        }
    }

    fn below(&mut self, n: usize) -> usize {
        (self.rng.next_u64() % n.max(1) as u64) as usize
    }

    fn pick_live(&mut self, model: &ReferenceModel) -> Option<usize> {
        if model.live.is_empty() {
            return None;
        }
        let n = self.below(model.live.len());
        model.live.iter().nth(n).copied()
    }

    fn pick_tag(&mut self) -> Status {
        Status::ALL[self.below(Status::ALL.len())]
    }

    /// Apply one random operation. Masks must already exist in `store`.
    pub fn step(&mut self, store: &mut AgentStore, model: &mut ReferenceModel) {
        match self.below(20) {
            0..=7 => {
                let id = self.next_id;
                self.next_id += 1;
                let index = store.insert(Agent::new(id, age_for(id)));
                model.insert(index);
            }
            8..=11 => {
                if let Some(index) = self.pick_live(model) {
                    store.mark_invalid(index);
                    model.retire(index);
                }
            }
            12..=16 => {
                if let Some(index) = self.pick_live(model) {
                    let tag = self.pick_tag();
                    store.set(tag, index);
                    model.set(tag, index);
                }
            }
            17..=18 => {
                if let Some(index) = self.pick_live(model) {
                    let tag = self.pick_tag();
                    store.clear(tag, index);
                    model.clear(tag, index);
                }
            }
            _ => {
                let tag = self.pick_tag();
                store.clear_all(tag);
                model.clear_all(tag);
            }
        }
    }

    /// Apply `steps` random operations.
    pub fn run(&mut self, store: &mut AgentStore, model: &mut ReferenceModel, steps: usize) {
        for _ in 0..steps {
            self.step(store, model);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_inserts_in_index_order() {
        let store = PopulationBuilder::new(100).block_capacity(64).build();
        assert_eq!(store.count(), 100);
        assert_eq!(store.get(42).id, 42);
        assert_eq!(store.get(42).age, age_for(42));
    }

    #[test]
    fn builder_tags_school_age() {
        let store = PopulationBuilder::new(500)
            .block_capacity(64)
            .tag_school_age()
            .build();
        let want = (0..500).filter(|&id| (5..=18).contains(&age_for(id))).count();
        assert_eq!(store.count_masked(Status::SchoolAge), want);
        assert_eq!(store.count_masked(Status::Infectious), 0);
    }

    #[test]
    fn model_of_fresh_store_matches() {
        let store = PopulationBuilder::new(300)
            .block_capacity(64)
            .tag_school_age()
            .build();
        ReferenceModel::of(&store).assert_matches(&store);
    }

    #[test]
    fn churn_is_deterministic() {
        let run = |seed| {
            let mut store = PopulationBuilder::new(0)
                .block_capacity(64)
                .tag_school_age()
                .build();
            let mut model = ReferenceModel::new();
            Churn::new(seed).run(&mut store, &mut model, 500);
            store.iter().map(|(i, a)| (i, a.id)).collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
    }
}
