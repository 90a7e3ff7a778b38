//! # Corepool: Scalable Lock-Free Object Pooling
//!
//! This crate provides a multi-producer/multi-consumer object pool built on
//! per-core ring-array slots, designed for workloads that acquire and
//! release a fixed set of objects at very high frequency from arbitrary
//! execution contexts.
//!
//! ## Key Features
//!
//! - **Per-core slots**: objects scatter across one ring per core, so hot
//!   paths run against cache-warm, core-local state
//! - **Lock-free protocols**: push and pop never take a lock, never block,
//!   and never allocate; a stalled operation blocks only its own ring
//!   position
//! - **ABA-free entries**: every ring position carries an epoch tag equal
//!   to the absolute index of its most recent push
//! - **Nestable operations**: push and pop are safe from interrupt-like
//!   contexts that preempted another pool operation on the same core
//! - **Three population modes**: objects embedded in slot storage, carved
//!   from a caller-provided bulk buffer, or added one by one
//! - **Accountable teardown**: drain surfaces every reference exactly once
//!   to a release callback, classified by storage origin
//!
//! The pool does not preserve FIFO or LIFO order, does not guarantee
//! fairness, and never grows or shrinks after initialization.
//!
//! ## Quick Start
//!
//! ```rust
//! use corepool::{ObjectPool, PoolConfig};
//!
//! // 64 embedded objects of 128 bytes, balanced across cores
//! let pool = ObjectPool::new(PoolConfig::balanced(64, 128)).unwrap();
//!
//! let obj = pool.pop().expect("freshly initialized pool has objects");
//! // ... use the 128 bytes at `obj` ...
//! unsafe { pool.push(obj).unwrap() };
//! ```

#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod error;
pub mod placement;
pub mod pool;
pub mod stats;

mod prefetch;
mod slot;

// Re-export core types
pub use config::{AllocPolicy, BalanceMode, PoolConfig};
pub use error::{PoolError, Result};
pub use placement::{node_count, CACHE_LINE_SIZE};
pub use pool::{ObjectPool, ReleaseEvent};
pub use stats::PoolStats;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
