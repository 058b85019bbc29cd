//! Marshalling errors.
//!
//! Only the runtime can make an encode fail. Problems with the value being
//! encoded are diagnostics, not errors.

use flowvalue_types::{MemoryError, RuntimeError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarshalError {
    /// A runtime primitive failed (out of memory, invalid pointer, trap).
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Writing a temporary buffer into runtime memory failed.
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
}

/// Result alias for encode operations.
pub type MarshalResult<T> = Result<T, MarshalError>;
