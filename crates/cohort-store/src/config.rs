//! Store configuration parameters.

use crate::error::StoreError;
use crate::position::REGISTER_WIDTH;

/// Configuration for an [`EntityStore`](crate::EntityStore).
///
/// Controls block sizing and the parallel worker pool. Validated at
/// construction; all values are immutable after creation, so several
/// stores with different sizing can coexist in one process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Number of entity slots per block.
    ///
    /// Default: 16_384 (256 registers of 64 bits each).
    /// Must be a power of two and at least one register wide (64).
    pub block_capacity: usize,

    /// Number of workers used by the parallel traversals.
    ///
    /// `None` runs on the rayon global pool and reports its thread count.
    /// `Some(n)` builds a dedicated pool of `n` threads, clamped to
    /// `[1, MAX_WORKERS]`.
    pub worker_count: Option<usize>,
}

impl StoreConfig {
    /// Default block capacity: 256 registers × 64 bits.
    pub const DEFAULT_BLOCK_CAPACITY: usize = 16_384;

    /// Upper bound on the dedicated worker pool size.
    pub const MAX_WORKERS: usize = 256;

    /// Create a config with the given block capacity and the global pool.
    pub fn new(block_capacity: usize) -> Self {
        Self {
            block_capacity,
            worker_count: None,
        }
    }

    /// Use a dedicated pool of `workers` threads.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_count = Some(workers);
        self
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), StoreError> {
        let capacity = self.block_capacity;
        if capacity < REGISTER_WIDTH || !capacity.is_power_of_two() {
            return Err(StoreError::InvalidBlockCapacity { capacity });
        }
        Ok(())
    }

    /// Number of 64-bit mask registers covering one block.
    pub fn registers_per_block(&self) -> usize {
        self.block_capacity / REGISTER_WIDTH
    }

    /// Resolve the worker count, applying the global pool size if `None`.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.clamp(1, Self::MAX_WORKERS),
            None => rayon::current_num_threads(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BLOCK_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_block_is_256_registers() {
        let config = StoreConfig::default();
        assert_eq!(config.block_capacity, 16_384);
        assert_eq!(config.registers_per_block(), 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_non_power_of_two() {
        let config = StoreConfig::new(1000);
        assert_eq!(
            config.validate(),
            Err(StoreError::InvalidBlockCapacity { capacity: 1000 })
        );
    }

    #[test]
    fn rejects_sub_register_block() {
        assert!(StoreConfig::new(32).validate().is_err());
        assert!(StoreConfig::new(64).validate().is_ok());
    }

    #[test]
    fn explicit_workers_are_clamped() {
        assert_eq!(StoreConfig::new(64).with_workers(0).resolved_worker_count(), 1);
        assert_eq!(StoreConfig::new(64).with_workers(4).resolved_worker_count(), 4);
        assert_eq!(
            StoreConfig::new(64)
                .with_workers(10_000)
                .resolved_worker_count(),
            StoreConfig::MAX_WORKERS
        );
    }

    #[test]
    fn global_pool_reports_at_least_one_worker() {
        assert!(StoreConfig::default().resolved_worker_count() >= 1);
    }
}
