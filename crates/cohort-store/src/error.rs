//! Store-specific error types.
//!
//! Only data-driven failures are reported through [`StoreError`].
//! Misuse of the slot lifecycle (retiring a dead index, reading past the
//! grown index space) is a bug in the caller and panics instead.

use std::error::Error;
use std::fmt;

/// Recoverable errors from store construction and range definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// Block capacity is not a power of two of at least one register.
    InvalidBlockCapacity {
        /// The rejected capacity.
        capacity: usize,
    },
    /// A labeled range whose begin lies after its end, or whose end is
    /// `usize::MAX`.
    InvalidRange {
        /// First index of the rejected range.
        begin: usize,
        /// Last index of the rejected range.
        end: usize,
    },
    /// The dedicated worker pool could not be built.
    ThreadPool {
        /// Description of the pool failure.
        reason: String,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBlockCapacity { capacity } => {
                write!(
                    f,
                    "block capacity {capacity} must be a power of two and at least 64"
                )
            }
            Self::InvalidRange { begin, end } => {
                write!(f, "invalid range [{begin}, {end}]")
            }
            Self::ThreadPool { reason } => {
                write!(f, "worker pool could not be built: {reason}")
            }
        }
    }
}

impl Error for StoreError {}
