//! The value decoder: runtime slots into host values.
//!
//! Decoding is total. Whatever the memory holds, every call returns a
//! [`ValueWithType`]; anything unexpected is reported to the session's
//! diagnostics and decodes as `Undefined`. Strings, blobs and records are
//! copied out, so a decoded value never aliases runtime memory.

use flowvalue_types::layout::{
    self, ARRAY_COUNT_OFFSET, ARRAY_HEADER_SIZE, ARRAY_TYPE_OFFSET, BLOB_LEN_OFFSET,
    REF_DATA_OFFSET, SLOT_SIZE,
};
use flowvalue_types::{MemoryError, MemoryResult, MemoryView, Ptr, TypeCatalog, TypeIndex, ValueTag};

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::handles::ResourceHandleTable;
use crate::host::{HostValue, ValueWithType};
use crate::shape::Shape;

/// Maximum nesting of array blocks followed by one decode.
pub const MAX_DECODE_DEPTH: usize = 256;

pub struct Decoder<'a> {
    memory: MemoryView<'a>,
    catalog: &'a TypeCatalog,
    handles: &'a ResourceHandleTable,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Decoder<'a> {
    pub fn new(
        memory: MemoryView<'a>,
        catalog: &'a TypeCatalog,
        handles: &'a ResourceHandleTable,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        Self {
            memory,
            catalog,
            handles,
            diagnostics,
        }
    }

    /// Decode the slot at `slot`.
    pub fn decode_value(&mut self, slot: Ptr) -> ValueWithType {
        self.value_at(slot, 0)
    }

    /// Decode the array block at `block`.
    ///
    /// With `expected_types`, a block whose shape none of them admits
    /// decodes as `Undefined` without a diagnostic: sequences need some
    /// `array:*` type, records need their own type name.
    pub fn decode_array(&mut self, block: Ptr, expected_types: Option<&[&str]>) -> ValueWithType {
        self.array_at(block, expected_types, 0)
    }

    /// Decode the slot at `slot`, or `None` when its value type is not one
    /// of `expected_types`.
    pub fn decode_expecting(&mut self, slot: Ptr, expected_types: &[&str]) -> Option<ValueWithType> {
        let decoded = self.decode_value(slot);
        expected_types
            .contains(&decoded.value_type.as_str())
            .then_some(decoded)
    }

    /// Decode an expression list: a `u32` count followed, from offset 8, by
    /// that many slots.
    pub fn decode_value_list(&mut self, list: Ptr) -> Vec<HostValue> {
        let count = match self.checked_block(list) {
            Ok(count) => count,
            Err(e) => {
                self.fault(list, &e);
                return Vec::new();
            }
        };
        (0..count)
            .map(|i| self.value_at(layout::element_slot(list, i), 0).value)
            .collect()
    }

    fn value_at(&mut self, slot: Ptr, depth: usize) -> ValueWithType {
        match self.try_value_at(slot, depth) {
            Ok(value) => value,
            Err(e) => {
                self.fault(slot, &e);
                ValueWithType::undefined()
            }
        }
    }

    fn try_value_at(&mut self, slot: Ptr, depth: usize) -> MemoryResult<ValueWithType> {
        let mem = self.memory;
        let byte = mem.read_u8(slot)?;
        let Some(tag) = ValueTag::from_byte(byte) else {
            self.diagnostics.report(
                DiagnosticKind::UnknownTag,
                format!("unknown value tag {byte} at {slot}"),
            );
            return Ok(ValueWithType::undefined());
        };
        let payload = layout::payload(slot).align_down(tag.payload().align);

        let value = match tag {
            ValueTag::Undefined => HostValue::Undefined,
            ValueTag::Null => HostValue::Null,
            ValueTag::Boolean => HostValue::Boolean(mem.read_i32(payload)? != 0),
            ValueTag::Int8 => HostValue::Number(f64::from(mem.read_i8(payload)?)),
            ValueTag::UInt8 => HostValue::Number(f64::from(mem.read_u8(payload)?)),
            ValueTag::Int16 => HostValue::Number(f64::from(mem.read_i16(payload)?)),
            ValueTag::UInt16 => HostValue::Number(f64::from(mem.read_u16(payload)?)),
            ValueTag::Int32 => HostValue::Number(f64::from(mem.read_i32(payload)?)),
            ValueTag::UInt32 => HostValue::Number(f64::from(mem.read_u32(payload)?)),
            ValueTag::Int64 => HostValue::BigInt(i128::from(mem.read_i64(payload)?)),
            ValueTag::UInt64 => HostValue::BigInt(i128::from(mem.read_u64(payload)?)),
            ValueTag::Float => HostValue::Number(f64::from(mem.read_f32(payload)?)),
            ValueTag::Double => HostValue::Number(mem.read_f64(payload)?),
            ValueTag::String => HostValue::String(mem.read_c_str(mem.read_ptr(payload)?)?),
            ValueTag::StringRef => {
                let ref_box = mem.read_ptr(payload)?;
                let text = mem.read_ptr(ref_box.add(REF_DATA_OFFSET))?;
                HostValue::String(mem.read_c_str(text)?)
            }
            ValueTag::Array => {
                let block = mem.read_ptr(payload)?;
                return Ok(self.array_at(block, None, depth + 1));
            }
            ValueTag::ArrayRef => {
                let block = layout::ref_array_block(mem.read_ptr(payload)?);
                return Ok(self.array_at(block, None, depth + 1));
            }
            ValueTag::BlobRef => {
                let ref_box = mem.read_ptr(payload)?;
                let data = mem.read_ptr(ref_box.add(REF_DATA_OFFSET))?;
                let len = mem.read_u32(ref_box.add(BLOB_LEN_OFFSET))?;
                HostValue::Blob(mem.read_bytes(data, len)?)
            }
            ValueTag::Stream => {
                let handle = mem.read_u32(payload)?;
                match self.handles.get(handle) {
                    Some(resource) => HostValue::Resource(resource.clone()),
                    None => {
                        self.diagnostics.report(
                            DiagnosticKind::UnknownResource,
                            format!("no resource registered for stream handle {handle}"),
                        );
                        return Ok(ValueWithType::undefined());
                    }
                }
            }
            ValueTag::Date => HostValue::Date(mem.read_f64(payload)?),
        };
        Ok(ValueWithType::new(value, tag.value_type_name()))
    }

    fn array_at(
        &mut self,
        block: Ptr,
        expected_types: Option<&[&str]>,
        depth: usize,
    ) -> ValueWithType {
        if depth > MAX_DECODE_DEPTH {
            self.diagnostics.report(
                DiagnosticKind::DepthExceeded,
                format!("array at {block} nested deeper than {MAX_DECODE_DEPTH} levels"),
            );
            return ValueWithType::undefined();
        }
        match self.try_array_at(block, expected_types, depth) {
            Ok(value) => value,
            Err(e) => {
                self.fault(block, &e);
                ValueWithType::undefined()
            }
        }
    }

    fn try_array_at(
        &mut self,
        block: Ptr,
        expected_types: Option<&[&str]>,
        depth: usize,
    ) -> MemoryResult<ValueWithType> {
        let count = self.memory.read_u32(block.add(ARRAY_COUNT_OFFSET))?;
        let type_index = TypeIndex(self.memory.read_u32(block.add(ARRAY_TYPE_OFFSET))?);

        let catalog = self.catalog;
        let Some(descriptor) = catalog.get(type_index) else {
            self.diagnostics.report(
                DiagnosticKind::UnknownType,
                format!("array at {block} has unknown type {type_index}"),
            );
            return Ok(ValueWithType::undefined());
        };
        let shape = Shape::of(descriptor);
        if let Some(expected) = expected_types {
            if !shape.accepts(expected) {
                return Ok(ValueWithType::undefined());
            }
        }

        // records only read as many slots as they have fields
        let readable = match shape.required_len() {
            Some(required) => count.min(u32::try_from(required).unwrap_or(u32::MAX)),
            None => count,
        };
        self.check_slots(block, readable)?;

        let members = shape.members(count as usize);
        let value = match shape {
            Shape::Sequence { .. } => HostValue::Array(
                members
                    .iter()
                    .map(|m| self.member_value(block, m.index, depth))
                    .collect(),
            ),
            Shape::Record { .. } => HostValue::Object(
                members
                    .iter()
                    .map(|m| {
                        let name = m.name.unwrap_or_default().to_string();
                        (name, self.member_value(block, m.index, depth))
                    })
                    .collect(),
            ),
        };
        if let Some(required) = shape.required_len() {
            if (count as usize) < required {
                self.diagnostics.report(
                    DiagnosticKind::InvalidArraySize,
                    format!(
                        "invalid array size: {} has {required} fields, block at {block} holds {count}",
                        descriptor.value_type
                    ),
                );
            }
        }
        Ok(ValueWithType::new(value, shape.value_type()))
    }

    fn member_value(&mut self, block: Ptr, index: usize, depth: usize) -> HostValue {
        self.value_at(layout::element_slot(block, index as u32), depth)
            .value
    }

    /// Element count of the block at `block`, after checking that all of its
    /// slots lie inside memory.
    fn checked_block(&self, block: Ptr) -> MemoryResult<u32> {
        let count = self.memory.read_u32(block.add(ARRAY_COUNT_OFFSET))?;
        self.check_slots(block, count)?;
        Ok(count)
    }

    fn check_slots(&self, block: Ptr, slots: u32) -> MemoryResult<()> {
        let end = u64::from(block.0)
            + u64::from(ARRAY_HEADER_SIZE)
            + u64::from(slots) * u64::from(SLOT_SIZE);
        if end > self.memory.len() as u64 {
            return Err(MemoryError::OutOfBounds {
                ptr: block,
                len: slots.saturating_mul(SLOT_SIZE).saturating_add(ARRAY_HEADER_SIZE),
                size: self.memory.len(),
            });
        }
        Ok(())
    }

    fn fault(&mut self, at: Ptr, error: &MemoryError) {
        self.diagnostics.report(
            DiagnosticKind::MemoryFault,
            format!("reading value at {at}: {error}"),
        );
    }
}

