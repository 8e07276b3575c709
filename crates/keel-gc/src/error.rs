//! Allocator errors

use crate::handle::Handle;
use thiserror::Error;

/// Errors raised by the allocation registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GcError {
    /// The handle names a slot that was reclaimed or never allocated
    #[error("stale handle {0}")]
    StaleHandle(Handle),

    /// `unpin` on an allocation whose pin count is already zero
    #[error("pin underflow on {0}")]
    PinUnderflow(Handle),

    /// Pin count would overflow `u32`
    #[error("pin overflow on {0}")]
    PinOverflow(Handle),

    /// Allocating would exceed the configured heap limit
    #[error("heap limit exceeded: requested {requested} bytes with {live} live of {limit}")]
    HeapLimitExceeded {
        /// Bytes requested by the failing allocation
        requested: usize,
        /// Bytes live at the time of the request
        live: usize,
        /// Configured heap limit
        limit: usize,
    },

    /// The slot table cannot address more allocations
    #[error("slot table exhausted")]
    SlotsExhausted,
}

/// Result type for allocator operations
pub type GcResult<T> = std::result::Result<T, GcError>;
