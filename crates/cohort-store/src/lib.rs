//! Block-allocated entity storage for agent-based simulations.
//!
//! Holds millions of entities (agents, places) in fixed-capacity blocks
//! that are appended but never moved, so a slot's address is stable for
//! the life of the store. Retired slots are recycled through a free-slot
//! queue, and any number of tag masks classify entities into overlapping
//! groups that can be traversed without copying.
//!
//! # Architecture
//!
//! ```text
//! EntityStore<T, M, L>
//! ├── Vec<Box<[T]>>              blocks of C slots, never reallocated
//! ├── validity BitLayer          one bit per slot: holds a live entity
//! ├── free-slot queue            recycled positions first, then fresh ones
//! ├── IndexMap<M, UserMask>      tag layers grown in lock-step, with counts
//! └── IndexMap<L, LabeledRange>  precomputed [begin, end] sub-intervals
//! ```
//!
//! # Phases
//!
//! A host simulation alternates a mutation phase (allocate, validate,
//! retire, tag) with a traversal phase. Mutation takes `&mut self`;
//! the borrow checker keeps the two phases from overlapping.
//!
//! # Example
//!
//! ```rust
//! use cohort_store::{EntityStore, StoreConfig};
//!
//! #[derive(Default)]
//! struct Person {
//!     age: u8,
//!     days_infectious: u32,
//! }
//!
//! let mut people: EntityStore<Person, char> =
//!     EntityStore::with_config(StoreConfig::new(1024)).unwrap();
//! people.create_mask('I');
//!
//! for age in 0..100 {
//!     let id = people.insert(Person { age, days_infectious: 0 });
//!     if age % 10 == 0 {
//!         people.set('I', id);
//!     }
//! }
//! assert_eq!(people.count_masked('I'), 10);
//!
//! people.par_for_each_masked('I', |p| p.days_infectious += 1);
//! let sick: u32 = people.iter_masked('I').map(|(_, p)| p.days_infectious).sum();
//! assert_eq!(sick, 10);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod bits;
pub mod config;
pub mod error;
pub mod iter;
mod parallel;
pub mod position;
pub mod range;
pub mod store;
pub mod traits;

// Public re-exports for the primary API surface.
pub use config::StoreConfig;
pub use error::StoreError;
pub use iter::Iter;
pub use position::{BlockGeometry, Position, REGISTER_WIDTH};
pub use range::LabeledRange;
pub use store::EntityStore;
pub use traits::Tag;
