//! Allocation errors
//!
//! Every failure this crate can produce is an allocation failure. The fallible entry points return
//! `AllocResult`, the rest report the error and terminate the process.

use thiserror::Error;

/// Result type for allocations
pub type AllocResult<T> = Result<T, AllocError>;

/// Allocation error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// The native heap could not satisfy the request
    #[error("out of memory allocating {size} bytes")]
    OutOfMemory { size: usize },

    /// The request would grow the live payload bytes past the configured heap limit
    #[error("heap limit exceeded: requested {requested} bytes with {allocated} of {limit} bytes live")]
    HeapLimitExceeded {
        requested: usize,
        limit: usize,
        allocated: usize,
    },

    /// The request cannot be described by a valid layout (too large for the address space)
    #[error("invalid allocation size {size}")]
    InvalidLayout { size: usize },
}

/// Report an allocation failure and terminate the process.
///
/// There is no recovery path: state left behind by a failed allocation is not meant to be used.
pub fn fatal_alloc_error(error: &AllocError) -> ! {
    tracing::error!(target: "hsgc::gc", %error, "allocation failure");
    eprintln!("GC alloc failed: {error}");
    std::process::exit(1);
}
