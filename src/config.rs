//! Configuration for object pool construction
//!
//! A pool's geometry is fixed at initialization: object count, per-object
//! size, how objects balance across per-core slots, and which allocator the
//! slot storage may come from. Nothing here can change while the pool is
//! live.

use crate::error::{PoolError, Result};

/// How pre-allocated objects balance across per-core slots
///
/// This controls the per-slot ring capacity relative to the total object
/// count. It trades memory for tolerance of skewed caller distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceMode {
    /// Objects scatter equally among all slots; a slot holds roughly
    /// `capacity / cores` objects. Most memory-efficient.
    Balanced,
    /// Any single core may end up holding every object; each slot is sized
    /// for the full object count. The performance mode for skewed workloads.
    Performance,
    /// Each slot is sized for `capacity / n` objects, for imbalance degrees
    /// between the two extremes.
    Sharded(u32),
}

/// Allocation context the caller can tolerate during init and teardown
///
/// Steady-state `push`/`pop` never allocate; this only constrains how slot
/// storage is obtained and released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocPolicy {
    /// The caller may sleep: large slots can use the paged (mmap) allocator.
    MaySleep,
    /// The caller must not sleep: slot storage always comes from the global
    /// allocator.
    Atomic,
}

/// Configuration for an object pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Total number of objects the pool is sized for
    pub capacity: u32,
    /// Size in bytes of each pre-allocated object; 0 skips embedding and the
    /// pool is filled through `populate` or `add_scattered` instead
    pub object_size: usize,
    /// Imbalance tolerance, see [`BalanceMode`]
    pub balance: BalanceMode,
    /// Allocation context constraint, see [`AllocPolicy`]
    pub alloc: AllocPolicy,
    /// Number of per-core slots; `None` uses the detected core count
    pub cores: Option<usize>,
    /// Enable statistics collection (small overhead on contended paths)
    pub enable_stats: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 0,
            object_size: 0,
            balance: BalanceMode::Balanced,
            alloc: AllocPolicy::MaySleep,
            cores: None,
            enable_stats: false,
        }
    }
}

impl PoolConfig {
    /// Create a balanced configuration for `capacity` objects of
    /// `object_size` bytes
    pub fn balanced(capacity: u32, object_size: usize) -> Self {
        Self {
            capacity,
            object_size,
            ..Self::default()
        }
    }

    /// Create a performance-mode configuration: every slot can hold the
    /// entire working set, so pushes take the unconditional fast path even
    /// when all objects drain toward one core
    pub fn performance(capacity: u32, object_size: usize) -> Self {
        Self {
            capacity,
            object_size,
            balance: BalanceMode::Performance,
            ..Self::default()
        }
    }

    /// Create a sharded configuration with imbalance degree `shards`
    pub fn sharded(capacity: u32, object_size: usize, shards: u32) -> Self {
        Self {
            capacity,
            object_size,
            balance: BalanceMode::Sharded(shards),
            ..Self::default()
        }
    }

    /// Validate the parts of the configuration that do not depend on the
    /// resolved core count
    pub(crate) fn validate(&self) -> Result<()> {
        if let BalanceMode::Sharded(n) = self.balance {
            if n == 0 {
                return Err(PoolError::invalid_argument(
                    "sharded balance mode requires a non-zero shard count",
                ));
            }
        }
        if let Some(cores) = self.cores {
            if cores == 0 {
                return Err(PoolError::invalid_argument("core count must be non-zero"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.capacity, 0);
        assert_eq!(config.object_size, 0);
        assert_eq!(config.balance, BalanceMode::Balanced);
        assert_eq!(config.alloc, AllocPolicy::MaySleep);
        assert!(config.cores.is_none());
        assert!(!config.enable_stats);
    }

    #[test]
    fn test_presets() {
        let config = PoolConfig::performance(32, 128);
        assert_eq!(config.balance, BalanceMode::Performance);
        assert_eq!(config.capacity, 32);

        let config = PoolConfig::sharded(64, 0, 4);
        assert_eq!(config.balance, BalanceMode::Sharded(4));
    }

    #[test]
    fn test_validation() {
        assert!(PoolConfig::default().validate().is_ok());
        assert!(PoolConfig::sharded(16, 0, 0).validate().is_err());

        let config = PoolConfig {
            cores: Some(0),
            ..PoolConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
