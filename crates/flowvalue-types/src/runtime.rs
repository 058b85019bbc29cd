//! The execution runtime's allocation primitives.
//!
//! The runtime owns its linear memory and every slot, box and buffer in it.
//! The marshalling layer only calls these primitives; it never allocates or
//! frees runtime memory by any other route.

use crate::error::{RuntimeError, RuntimeResult};
use crate::memory::{MemoryMut, Ptr};

/// Primitive operations exported by a flow runtime.
///
/// Every `create_*` primitive returns a pointer to a freshly allocated
/// 16-byte slot that the caller owns and must eventually hand to
/// [`FlowRuntime::value_free`].
pub trait FlowRuntime {
    /// The whole linear memory.
    fn memory(&self) -> &[u8];

    fn memory_mut(&mut self) -> &mut [u8];

    /// Allocate `size` raw bytes.
    fn malloc(&mut self, size: u32) -> RuntimeResult<Ptr>;

    /// Release a raw allocation from [`FlowRuntime::malloc`].
    fn free(&mut self, ptr: Ptr) -> RuntimeResult<()>;

    fn create_undefined_value(&mut self) -> RuntimeResult<Ptr>;

    fn create_null_value(&mut self) -> RuntimeResult<Ptr>;

    fn create_boolean_value(&mut self, value: bool) -> RuntimeResult<Ptr>;

    fn create_int_value(&mut self, value: i32) -> RuntimeResult<Ptr>;

    fn create_double_value(&mut self, value: f64) -> RuntimeResult<Ptr>;

    /// Copy the NUL-terminated text at `text` into a new `StringRef` box.
    /// The caller keeps ownership of `text`.
    fn create_string_value(&mut self, text: Ptr) -> RuntimeResult<Ptr>;

    fn create_date_value(&mut self, millis: f64) -> RuntimeResult<Ptr>;

    fn create_stream_value(&mut self, handle: u32) -> RuntimeResult<Ptr>;

    /// Copy `len` bytes at `data` into a new `BlobRef` box.
    /// The caller keeps ownership of `data`.
    fn create_blob_value(&mut self, data: Ptr, len: u32) -> RuntimeResult<Ptr>;

    /// Allocate an `ArrayRef` holding `size` `Undefined` slots tagged with
    /// runtime type `type_index`.
    fn create_array_value(&mut self, size: u32, type_index: u32) -> RuntimeResult<Ptr>;

    /// Copy the slot at `value` into element `index` of `array`. The array
    /// takes its own reference to any boxed payload; the caller still owns
    /// `value`.
    fn array_value_set_element_value(
        &mut self,
        array: Ptr,
        index: u32,
        value: Ptr,
    ) -> RuntimeResult<()>;

    /// Drop the slot's reference to its boxed payload and free the slot.
    fn value_free(&mut self, value: Ptr) -> RuntimeResult<()>;

    /// Copy `text` into a fresh NUL-terminated buffer owned by the caller.
    fn allocate_utf8(&mut self, text: &str) -> RuntimeResult<Ptr> {
        let bytes = text.as_bytes();
        let len = u32::try_from(bytes.len()).map_err(|_| RuntimeError::OutOfMemory {
            requested: u32::MAX,
        })?;
        let ptr = self.malloc(len.saturating_add(1))?;
        let mut mem = MemoryMut::new(self.memory_mut());
        mem.write_bytes(ptr, bytes)?;
        mem.write_u8(ptr.add(len), 0)?;
        Ok(ptr)
    }

    /// Copy `data` into a fresh buffer owned by the caller.
    fn allocate_bytes(&mut self, data: &[u8]) -> RuntimeResult<Ptr> {
        let len = u32::try_from(data.len()).map_err(|_| RuntimeError::OutOfMemory {
            requested: u32::MAX,
        })?;
        let ptr = self.malloc(len.max(1))?;
        MemoryMut::new(self.memory_mut()).write_bytes(ptr, data)?;
        Ok(ptr)
    }
}
