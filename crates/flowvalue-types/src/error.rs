//! Error types shared by every crate in the workspace.

use thiserror::Error;

use crate::memory::Ptr;

/// A linear-memory access fell outside the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// `len` bytes starting at `ptr` do not fit in a memory of `size` bytes.
    #[error("memory access out of bounds: {len} bytes at {ptr} (memory size {size})")]
    OutOfBounds { ptr: Ptr, len: u32, size: usize },

    /// No NUL terminator was found before the end of memory.
    #[error("unterminated string at {0}")]
    Unterminated(Ptr),
}

/// Memory access result type alias.
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Failures reported by a runtime's allocation primitives.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// The runtime could not satisfy an allocation.
    #[error("out of memory (requested {requested} bytes)")]
    OutOfMemory { requested: u32 },

    /// A pointer passed to `free` was not a live allocation.
    #[error("invalid free of {0}")]
    InvalidFree(Ptr),

    /// A pointer did not refer to a value of the expected kind.
    #[error("invalid value at {ptr}: {reason}")]
    InvalidValue { ptr: Ptr, reason: String },

    /// The runtime trapped while executing a primitive.
    #[error("runtime trap: {0}")]
    Trap(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Runtime primitive result type alias.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised while loading a type catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The assets-map JSON could not be parsed.
    #[error("invalid type catalog: {0}")]
    Json(#[from] serde_json::Error),

    /// `typeIndexes` names a type index that does not exist.
    #[error("type index {index} for \"{name}\" is out of range ({count} types)")]
    IndexOutOfRange { name: String, index: u32, count: usize },
}

/// Catalog loading result type alias.
pub type CatalogResult<T> = Result<T, CatalogError>;
