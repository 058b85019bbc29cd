//! Module assembly errors.

use thiserror::Error;

/// Errors that can occur while assembling the runtime module.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// The assembled module failed validation.
    #[error("WASM validation failed: {0}")]
    ValidationFailed(String),
}

/// Module assembly result type alias.
pub type ModuleResult<T> = Result<T, ModuleError>;
