//! Shared types for flow value marshalling.
//!
//! This crate defines the vocabulary both sides of the runtime boundary agree
//! on: the tag byte of every value slot, the binary layout of slots, arrays
//! and ref boxes, bounds-checked access to the runtime's linear memory, the
//! type descriptor catalog, and the allocation primitives the runtime exposes.

mod catalog;
mod error;
pub mod layout;
mod memory;
mod runtime;
mod tag;
pub mod value_type;

pub use catalog::{FieldDescriptor, TypeCatalog, TypeDescriptor, TypeIndex, TypeKind};
pub use error::{CatalogError, CatalogResult, MemoryError, MemoryResult, RuntimeError, RuntimeResult};
pub use memory::{MemoryMut, MemoryView, Ptr};
pub use runtime::FlowRuntime;
pub use tag::{PayloadLayout, ValueTag};
