//! Statistics for pool operations
//!
//! Counters are plain relaxed atomics, padded to their own cache lines so
//! that bookkeeping from one core does not bounce lines under another
//! core's hot path. Collection is optional and chosen at init time.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for object pool operations
///
/// All counters are monotone. The slot-abandon counter replaces the
/// long-spin diagnostics some pop implementations print: a pop that finds a
/// ring position reserved but not yet published gives up on that slot and
/// bumps the counter instead of spinning or logging.
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Objects returned to the pool
    pub pushes: CachePadded<AtomicU64>,
    /// Objects taken from the pool
    pub pops: CachePadded<AtomicU64>,
    /// Pops that found every slot empty
    pub empty_pops: CachePadded<AtomicU64>,
    /// Pops that abandoned a slot on a suspected in-flight push
    pub slot_abandons: CachePadded<AtomicU64>,
    /// Pops served by a slot other than the caller's own
    pub remote_pops: CachePadded<AtomicU64>,
    /// Pushes that had to walk past a full slot
    pub push_walks: CachePadded<AtomicU64>,
}

impl PoolStats {
    /// Fraction of successful pops served by a remote slot (0.0 to 1.0)
    ///
    /// High values mean callers are draining cores they do not run on, a
    /// sign the balance mode is too tight for the workload.
    pub fn remote_pop_ratio(&self) -> f64 {
        let pops = self.pops.load(Ordering::Relaxed);
        let remote = self.remote_pops.load(Ordering::Relaxed);
        if pops == 0 {
            0.0
        } else {
            remote as f64 / pops as f64
        }
    }

    /// Fraction of pop attempts that ran into an in-flight push (0.0 to 1.0)
    pub fn abandon_ratio(&self) -> f64 {
        let pops = self.pops.load(Ordering::Relaxed);
        let empty = self.empty_pops.load(Ordering::Relaxed);
        let abandons = self.slot_abandons.load(Ordering::Relaxed);
        let attempts = pops + empty;
        if attempts == 0 {
            0.0
        } else {
            abandons as f64 / attempts as f64
        }
    }
}
