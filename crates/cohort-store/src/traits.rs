//! Key trait for mask tags and range labels.

use std::fmt::Debug;
use std::hash::Hash;

/// A small copyable key naming a user mask or a labeled range.
///
/// Simulations typically use `char` or a fieldless enum (`Infectious`,
/// `SchoolAge`, ...). Blanket-implemented for every qualifying type.
pub trait Tag: Copy + Eq + Hash + Debug + Send + Sync {}

impl<K: Copy + Eq + Hash + Debug + Send + Sync> Tag for K {}
