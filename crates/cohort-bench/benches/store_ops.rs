//! Criterion micro-benchmarks for slot allocation, retirement and mask edits.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cohort_bench::{reference_profile, REFERENCE_AGENTS};
use cohort_store::{EntityStore, StoreConfig};
use cohort_test_utils::{Agent, Status};

/// Benchmark: Insert 100K agents into an empty store (includes block growth).
fn bench_insert_100k(c: &mut Criterion) {
    c.bench_function("insert_100k", |b| {
        b.iter(|| {
            let mut store: EntityStore<Agent, Status> = EntityStore::new();
            for id in 0..REFERENCE_AGENTS {
                store.insert(Agent::new(id, 30));
            }
            black_box(store.count());
        });
    });
}

/// Benchmark: Retire then re-insert 10K agents spread across the population.
fn bench_churn_10k(c: &mut Criterion) {
    let mut store = reference_profile(42);

    c.bench_function("churn_10k", |b| {
        b.iter(|| {
            for index in (0..REFERENCE_AGENTS).step_by(10) {
                store.mark_invalid(index);
            }
            for id in 0..REFERENCE_AGENTS / 10 {
                black_box(store.insert(Agent::new(id, 40)));
            }
        });
    });
}

/// Benchmark: Tag then clear every agent in one mask.
fn bench_mask_set_clear_100k(c: &mut Criterion) {
    let mut store = reference_profile(42);

    c.bench_function("mask_set_clear_100k", |b| {
        b.iter(|| {
            for index in 0..REFERENCE_AGENTS {
                store.set(Status::Vaccinated, index);
            }
            black_box(store.count_masked(Status::Vaccinated));
            store.clear_all(Status::Vaccinated);
        });
    });
}

/// Benchmark: Sort a fragmented free-slot queue.
fn bench_sort_free_slots(c: &mut Criterion) {
    c.bench_function("sort_free_slots", |b| {
        b.iter(|| {
            let mut store: EntityStore<Agent, Status> =
                EntityStore::with_config(StoreConfig::new(1024)).unwrap();
            for id in 0..REFERENCE_AGENTS {
                store.insert(Agent::new(id, 1));
            }
            for index in (0..REFERENCE_AGENTS).step_by(3) {
                store.mark_invalid(index);
            }
            store.sort_free_slots();
            black_box(store.free_slot_count());
        });
    });
}

criterion_group!(
    benches,
    bench_insert_100k,
    bench_churn_10k,
    bench_mask_set_clear_100k,
    bench_sort_free_slots
);
criterion_main!(benches);
