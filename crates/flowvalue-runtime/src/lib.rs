//! Reference flow runtimes.
//!
//! The marshalling layer talks to a runtime only through
//! [`flowvalue_types::FlowRuntime`]. This crate provides two interchangeable
//! implementations of that contract with byte-identical memory layouts:
//!
//! - [`HeapRuntime`]: a native linear memory with allocation accounting,
//!   used by hosts that embed the runtime in-process and by tests that need
//!   to detect leaks and double frees.
//! - [`emit_runtime_module`]: a self-contained `.wasm` module exporting the
//!   same primitives under their conventional `_create*Value` names, for
//!   hosts that drive a real WebAssembly engine.

pub mod abi;
pub mod error;
mod heap;
mod module;

pub use error::{ModuleError, ModuleResult};
pub use heap::{HeapRuntime, HEAP_START};
pub use module::{emit_runtime_module, RUNTIME_MEMORY_PAGES};
