//! Benchmark profiles and utilities for the cohort entity store.
//!
//! Provides pre-built populations for benchmarking:
//!
//! - [`reference_profile`]: 100K agents in default-size blocks
//! - [`stress_profile`]: 1M agents for stress testing
//! - [`seed_infections`]: deterministic mask assignment via seed

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use cohort_test_utils::{AgentStore, PopulationBuilder, Region, Status};

/// Agents in the reference profile.
pub const REFERENCE_AGENTS: usize = 100_000;

/// Agents in the stress profile.
pub const STRESS_AGENTS: usize = 1_000_000;

/// Build a reference benchmark population: 100K agents.
///
/// School-age agents are tagged, roughly one in ten agents is tagged
/// [`Status::Infectious`], and the two [`Region`] ranges split the index
/// space in half.
pub fn reference_profile(seed: u64) -> AgentStore {
    profile(REFERENCE_AGENTS, seed)
}

/// Build a stress benchmark population: 1M agents.
///
/// Same layout as [`reference_profile`] at 10x the population.
pub fn stress_profile(seed: u64) -> AgentStore {
    profile(STRESS_AGENTS, seed)
}

fn profile(agents: usize, seed: u64) -> AgentStore {
    let half = agents / 2;
    let mut store = PopulationBuilder::new(agents)
        .tag_school_age()
        .range(Region::North, 0, half - 1)
        .range(Region::South, half, agents - 1)
        .build();
    for index in seed_infections(agents, 10, seed) {
        store.set(Status::Infectious, index);
    }
    store
}

/// Pick about one index in `one_in` from `0..population`.
///
/// Uses a multiplicative hash of the seed, so the same arguments always
/// select the same indices. Returned indices are ascending and unique.
pub fn seed_infections(population: usize, one_in: u64, seed: u64) -> Vec<usize> {
    (0..population)
        .filter(|&i| {
            let h = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add((i as u64).wrapping_mul(1442695040888963407));
            (h >> 33) % one_in == 0
        })
        .collect()
}
