//! Error handling for the corepool library
//!
//! Error kinds are few and crisp: allocation failure, bad caller arguments,
//! capacity exhaustion during population, and unsupported topology. The hot
//! `push`/`pop` paths never construct errors.

use thiserror::Error;

/// Main error type for the corepool library
#[derive(Error, Debug)]
pub enum PoolError {
    /// Memory allocation failures
    #[error("memory allocation failed: requested {size} bytes")]
    OutOfMemory {
        /// Number of bytes requested
        size: usize,
    },

    /// Invalid configuration or parameter errors
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected argument
        message: String,
    },

    /// No room left for an object during population
    #[error("pool capacity exhausted: {capacity} objects")]
    CapacityExhausted {
        /// Total object capacity of the pool
        capacity: u32,
    },

    /// Feature not supported on this system
    #[error("not supported: {feature}")]
    Unsupported {
        /// Description of the unsupported feature
        feature: String,
    },
}

impl PoolError {
    /// Create an out of memory error
    pub fn out_of_memory(size: usize) -> Self {
        Self::OutOfMemory { size }
    }

    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a capacity exhausted error
    pub fn capacity_exhausted(capacity: u32) -> Self {
        Self::CapacityExhausted { capacity }
    }

    /// Create a not supported error
    pub fn unsupported<S: Into<String>>(feature: S) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, PoolError>;
