//! Native implementation of the runtime primitives.
//!
//! Memory is a flat `Vec<u8>` with a bump allocator. Freed blocks are not
//! reused, so every pointer stays unique for the runtime's lifetime and a
//! second `free` of the same pointer is always detected.

use std::collections::BTreeMap;

use flowvalue_types::layout::{
    self, ARRAY_COUNT_OFFSET, ARRAY_TYPE_OFFSET, BLOB_LEN_OFFSET, BLOB_REF_SIZE, REF_COUNT_OFFSET,
    REF_DATA_OFFSET, REF_HEADER_SIZE, SLOT_SIZE, STRING_REF_SIZE,
};
use flowvalue_types::{FlowRuntime, MemoryMut, MemoryView, Ptr, RuntimeError, RuntimeResult, ValueTag};

/// First address handed out by the allocator. Lower addresses (including
/// the null pointer) are never allocated.
pub const HEAP_START: u32 = 1024;

/// Default memory size: 1 MiB.
const DEFAULT_CAPACITY: u32 = 1 << 20;

/// Allocation granularity; every block is 8-byte aligned.
const ALLOC_ALIGN: u32 = 8;

/// In-process flow runtime.
#[derive(Debug, Clone)]
pub struct HeapRuntime {
    memory: Vec<u8>,
    /// Next free byte.
    next: u32,
    /// Live allocations: pointer → rounded size.
    live: BTreeMap<u32, u32>,
}

impl HeapRuntime {
    /// A runtime with 1 MiB of linear memory.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A runtime whose linear memory is `bytes` long.
    pub fn with_capacity(bytes: u32) -> Self {
        Self {
            memory: vec![0; bytes.max(HEAP_START) as usize],
            next: HEAP_START,
            live: BTreeMap::new(),
        }
    }

    /// Number of allocations not yet freed.
    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    /// Total bytes held by live allocations.
    pub fn live_bytes(&self) -> u64 {
        self.live.values().map(|s| u64::from(*s)).sum()
    }

    pub fn is_live(&self, ptr: Ptr) -> bool {
        self.live.contains_key(&ptr.0)
    }

    /// Reference count of the box a ref-tagged slot points at.
    pub fn ref_count(&self, slot: Ptr) -> RuntimeResult<u32> {
        let view = self.view();
        let tag = view.read_u8(slot)?;
        match ValueTag::from_byte(tag) {
            Some(t) if t.is_ref() => {
                let ref_box = view.read_ptr(layout::payload(slot))?;
                Ok(view.read_u32(ref_box.add(REF_COUNT_OFFSET))?)
            }
            _ => Err(RuntimeError::InvalidValue {
                ptr: slot,
                reason: format!("tag {tag} is not a ref tag"),
            }),
        }
    }

    fn view(&self) -> MemoryView<'_> {
        MemoryView::new(&self.memory)
    }

    fn mem(&mut self) -> MemoryMut<'_> {
        MemoryMut::new(&mut self.memory)
    }

    fn alloc_slot(&mut self, tag: ValueTag) -> RuntimeResult<Ptr> {
        let slot = self.malloc(SLOT_SIZE)?;
        self.mem().write_u8(slot, tag.byte())?;
        Ok(slot)
    }

    /// Allocate a `size`-byte box with refcount 1 and a slot pointing at it.
    /// On failure nothing stays allocated.
    fn alloc_boxed(&mut self, tag: ValueTag, size: u32) -> RuntimeResult<(Ptr, Ptr)> {
        let ref_box = self.malloc(size)?;
        let slot = match self.alloc_slot(tag) {
            Ok(slot) => slot,
            Err(e) => {
                self.free(ref_box)?;
                return Err(e);
            }
        };
        let mut mem = self.mem();
        mem.write_u32(ref_box.add(REF_COUNT_OFFSET), 1)?;
        mem.write_ptr(layout::payload(slot), ref_box)?;
        Ok((slot, ref_box))
    }

    /// Copy `len` bytes at `src` into a new buffer, then box it.
    fn copy_into_box(
        &mut self,
        tag: ValueTag,
        src: Ptr,
        len: u32,
        box_size: u32,
    ) -> RuntimeResult<(Ptr, Ptr)> {
        let buf = self.malloc(len)?;
        self.mem().copy_within(src, buf, len)?;
        match self.alloc_boxed(tag, box_size) {
            Ok((slot, ref_box)) => {
                self.mem().write_ptr(ref_box.add(REF_DATA_OFFSET), buf)?;
                Ok((slot, ref_box))
            }
            Err(e) => {
                self.free(buf)?;
                Err(e)
            }
        }
    }

    fn retain_payload(&mut self, slot: Ptr) -> RuntimeResult<()> {
        let view = self.view();
        let is_ref = ValueTag::from_byte(view.read_u8(slot)?).is_some_and(ValueTag::is_ref);
        if !is_ref {
            return Ok(());
        }
        let ref_box = view.read_ptr(layout::payload(slot))?;
        let count = view.read_u32(ref_box.add(REF_COUNT_OFFSET))?;
        self.mem()
            .write_u32(ref_box.add(REF_COUNT_OFFSET), count + 1)?;
        Ok(())
    }

    /// Drop one reference to the slot's box, releasing it at zero.
    fn release_payload(&mut self, slot: Ptr) -> RuntimeResult<()> {
        let view = self.view();
        let tag = match ValueTag::from_byte(view.read_u8(slot)?) {
            Some(tag) if tag.is_ref() => tag,
            _ => return Ok(()),
        };
        let ref_box = view.read_ptr(layout::payload(slot))?;
        let count = view.read_u32(ref_box.add(REF_COUNT_OFFSET))?;
        if count == 0 {
            return Err(RuntimeError::InvalidValue {
                ptr: ref_box,
                reason: "reference count underflow".to_string(),
            });
        }
        self.mem()
            .write_u32(ref_box.add(REF_COUNT_OFFSET), count - 1)?;
        if count > 1 {
            return Ok(());
        }

        if tag == ValueTag::ArrayRef {
            let block = layout::ref_array_block(ref_box);
            let size = self.view().read_u32(block.add(ARRAY_COUNT_OFFSET))?;
            for i in 0..size {
                self.release_payload(layout::element_slot(block, i))?;
            }
        } else {
            let data = self.view().read_ptr(ref_box.add(REF_DATA_OFFSET))?;
            self.free(data)?;
        }
        self.free(ref_box)
    }
}

impl Default for HeapRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowRuntime for HeapRuntime {
    fn memory(&self) -> &[u8] {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    fn malloc(&mut self, size: u32) -> RuntimeResult<Ptr> {
        let rounded = size
            .max(1)
            .checked_add(ALLOC_ALIGN - 1)
            .map(|s| s & !(ALLOC_ALIGN - 1))
            .ok_or(RuntimeError::OutOfMemory { requested: size })?;
        let ptr = self.next;
        let end = ptr
            .checked_add(rounded)
            .filter(|end| *end as usize <= self.memory.len())
            .ok_or(RuntimeError::OutOfMemory { requested: size })?;
        self.next = end;
        self.live.insert(ptr, rounded);
        Ok(Ptr(ptr))
    }

    fn free(&mut self, ptr: Ptr) -> RuntimeResult<()> {
        if ptr.is_null() {
            return Ok(());
        }
        self.live
            .remove(&ptr.0)
            .map(|_| ())
            .ok_or(RuntimeError::InvalidFree(ptr))
    }

    fn create_undefined_value(&mut self) -> RuntimeResult<Ptr> {
        self.alloc_slot(ValueTag::Undefined)
    }

    fn create_null_value(&mut self) -> RuntimeResult<Ptr> {
        self.alloc_slot(ValueTag::Null)
    }

    fn create_boolean_value(&mut self, value: bool) -> RuntimeResult<Ptr> {
        let slot = self.alloc_slot(ValueTag::Boolean)?;
        self.mem()
            .write_i32(layout::payload(slot), i32::from(value))?;
        Ok(slot)
    }

    fn create_int_value(&mut self, value: i32) -> RuntimeResult<Ptr> {
        let slot = self.alloc_slot(ValueTag::Int32)?;
        self.mem().write_i32(layout::payload(slot), value)?;
        Ok(slot)
    }

    fn create_double_value(&mut self, value: f64) -> RuntimeResult<Ptr> {
        let slot = self.alloc_slot(ValueTag::Double)?;
        self.mem().write_f64(layout::payload(slot), value)?;
        Ok(slot)
    }

    fn create_string_value(&mut self, text: Ptr) -> RuntimeResult<Ptr> {
        let len = self.view().c_str_len(text)?;
        let (slot, _) = self.copy_into_box(ValueTag::StringRef, text, len + 1, STRING_REF_SIZE)?;
        Ok(slot)
    }

    fn create_date_value(&mut self, millis: f64) -> RuntimeResult<Ptr> {
        let slot = self.alloc_slot(ValueTag::Date)?;
        self.mem().write_f64(layout::payload(slot), millis)?;
        Ok(slot)
    }

    fn create_stream_value(&mut self, handle: u32) -> RuntimeResult<Ptr> {
        let slot = self.alloc_slot(ValueTag::Stream)?;
        self.mem().write_u32(layout::payload(slot), handle)?;
        Ok(slot)
    }

    fn create_blob_value(&mut self, data: Ptr, len: u32) -> RuntimeResult<Ptr> {
        let (slot, ref_box) = self.copy_into_box(ValueTag::BlobRef, data, len, BLOB_REF_SIZE)?;
        self.mem().write_u32(ref_box.add(BLOB_LEN_OFFSET), len)?;
        Ok(slot)
    }

    fn create_array_value(&mut self, size: u32, type_index: u32) -> RuntimeResult<Ptr> {
        let box_size = layout::array_block_size(size)
            .and_then(|s| s.checked_add(REF_HEADER_SIZE))
            .ok_or(RuntimeError::OutOfMemory { requested: u32::MAX })?;
        let (slot, ref_box) = self.alloc_boxed(ValueTag::ArrayRef, box_size)?;
        let block = layout::ref_array_block(ref_box);
        let mut mem = self.mem();
        mem.write_u32(block.add(ARRAY_COUNT_OFFSET), size)?;
        mem.write_u32(block.add(ARRAY_TYPE_OFFSET), type_index)?;
        Ok(slot)
    }

    fn array_value_set_element_value(
        &mut self,
        array: Ptr,
        index: u32,
        value: Ptr,
    ) -> RuntimeResult<()> {
        let view = self.view();
        if view.read_u8(array)? != ValueTag::ArrayRef.byte() {
            return Err(RuntimeError::InvalidValue {
                ptr: array,
                reason: "not an array value".to_string(),
            });
        }
        let block = layout::ref_array_block(view.read_ptr(layout::payload(array))?);
        let count = view.read_u32(block.add(ARRAY_COUNT_OFFSET))?;
        if index >= count {
            return Err(RuntimeError::InvalidValue {
                ptr: array,
                reason: format!("element index {index} out of range ({count} elements)"),
            });
        }
        let dst = layout::element_slot(block, index);
        self.release_payload(dst)?;
        self.mem().copy_within(value, dst, SLOT_SIZE)?;
        self.retain_payload(dst)
    }

    fn value_free(&mut self, value: Ptr) -> RuntimeResult<()> {
        if value.is_null() {
            return Ok(());
        }
        if !self.is_live(value) {
            return Err(RuntimeError::InvalidFree(value));
        }
        self.release_payload(value)?;
        self.free(value)
    }
}
