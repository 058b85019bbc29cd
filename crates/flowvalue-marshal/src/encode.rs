//! The value encoder: host values into runtime slots.
//!
//! Every slot is created by a runtime primitive. The encoder never writes
//! slot bytes itself; it only fills temporary string and blob buffers, which
//! it frees as soon as the runtime has copied them.

use flowvalue_types::{FlowRuntime, Ptr, RuntimeError, TypeCatalog, TypeIndex, TypeKind};

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::MarshalResult;
use crate::handles::ResourceHandleTable;
use crate::host::HostValue;
use crate::object_type::ValueFieldDescription;
use crate::staging::{coerce, ArrayValue, StagedValue, Stager};

pub struct Encoder<'a, R: FlowRuntime + ?Sized> {
    runtime: &'a mut R,
    catalog: &'a TypeCatalog,
    handles: &'a mut ResourceHandleTable,
    diagnostics: &'a mut Diagnostics,
}

impl<'a, R: FlowRuntime + ?Sized> Encoder<'a, R> {
    pub fn new(
        runtime: &'a mut R,
        catalog: &'a TypeCatalog,
        handles: &'a mut ResourceHandleTable,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        Self {
            runtime,
            catalog,
            handles,
            diagnostics,
        }
    }

    /// Encode `value` into a new slot owned by the caller.
    ///
    /// Structured values need `declared`, the catalog type they are laid out
    /// as; without it they encode as `Null`. A declared basic type only
    /// affects numeric coercion of text.
    pub fn encode(&mut self, value: &HostValue, declared: Option<TypeIndex>) -> MarshalResult<Ptr> {
        self.encode_described(value, declared, None)
    }

    /// Encode with field accessors for a structured `declared` type.
    pub fn encode_described(
        &mut self,
        value: &HostValue,
        declared: Option<TypeIndex>,
        descriptions: Option<&[ValueFieldDescription]>,
    ) -> MarshalResult<Ptr> {
        let Some(type_index) = declared else {
            return self.encode_scalar(value);
        };
        let catalog = self.catalog;
        match catalog.get(type_index) {
            Some(descriptor) if descriptor.kind == TypeKind::Basic => {
                self.encode_scalar(&coerce(&descriptor.value_type, value))
            }
            Some(_) if value.is_nullish() => self.encode_scalar(value),
            Some(_) => {
                let staged =
                    Stager::new(catalog, &mut *self.diagnostics).stage(type_index, value, descriptions);
                match staged {
                    Some(array) => self.create_wasm_array_value(&array),
                    None => self.null(),
                }
            }
            None => {
                self.diagnostics.report(
                    DiagnosticKind::UnknownType,
                    format!("no catalog entry for type {type_index}"),
                );
                self.null()
            }
        }
    }

    /// Encode a value that needs no catalog type.
    pub fn encode_scalar(&mut self, value: &HostValue) -> MarshalResult<Ptr> {
        match value {
            HostValue::Undefined => Ok(self.runtime.create_undefined_value()?),
            HostValue::Null => self.null(),
            HostValue::Boolean(b) => Ok(self.runtime.create_boolean_value(*b)?),
            HostValue::Number(n) => self.encode_number(*n),
            HostValue::BigInt(i) => match i32::try_from(*i) {
                Ok(small) => Ok(self.runtime.create_int_value(small)?),
                Err(_) => Ok(self.runtime.create_double_value(*i as f64)?),
            },
            HostValue::String(text) => self.encode_string(text),
            HostValue::Date(millis) => Ok(self.runtime.create_date_value(*millis)?),
            HostValue::Blob(bytes) => self.encode_blob(bytes),
            HostValue::Resource(resource) => {
                let handle = self.handles.handle_for(resource);
                Ok(self.runtime.create_stream_value(handle)?)
            }
            HostValue::Array(_) | HostValue::Object(_) => {
                self.diagnostics.report(
                    DiagnosticKind::UnsupportedValue,
                    format!("{} value without a declared type", value.kind_name()),
                );
                self.null()
            }
        }
    }

    /// Write a staged structured value as an array block.
    ///
    /// Each element is built as its own slot, attached to the block (the
    /// runtime copies it and takes its own reference) and then released.
    /// On failure the partially built block is released too.
    pub fn create_wasm_array_value(&mut self, array: &ArrayValue) -> MarshalResult<Ptr> {
        let size = u32::try_from(array.values.len()).map_err(|_| RuntimeError::OutOfMemory {
            requested: u32::MAX,
        })?;
        let block = self.runtime.create_array_value(size, array.type_index.0)?;
        for (index, staged) in (0..size).zip(&array.values) {
            if let Err(e) = self.set_element(block, index, staged) {
                let _ = self.runtime.value_free(block);
                return Err(e);
            }
        }
        Ok(block)
    }

    fn set_element(&mut self, block: Ptr, index: u32, staged: &StagedValue) -> MarshalResult<()> {
        // build child
        let child = match staged {
            StagedValue::Value(value) => self.encode_scalar(value)?,
            StagedValue::Nested(nested) => self.create_wasm_array_value(nested)?,
        };
        // attach child, release temporary
        let attached = self
            .runtime
            .array_value_set_element_value(block, index, child);
        let released = self.runtime.value_free(child);
        attached?;
        released?;
        Ok(())
    }

    /// Integers in the `i32` range become `Int32`; everything else,
    /// including `-0.0`, NaN and infinities, becomes `Double`.
    fn encode_number(&mut self, n: f64) -> MarshalResult<Ptr> {
        match as_int32(n) {
            Some(i) => Ok(self.runtime.create_int_value(i)?),
            None => Ok(self.runtime.create_double_value(n)?),
        }
    }

    /// Strings cross as NUL-terminated UTF-8, so text holding a NUL cannot
    /// be carried whole and is replaced by `Null`.
    fn encode_string(&mut self, text: &str) -> MarshalResult<Ptr> {
        if let Some(at) = text.find('\0') {
            self.diagnostics.report(
                DiagnosticKind::UnsupportedValue,
                format!("string with a NUL at byte {at} would be truncated"),
            );
            return self.null();
        }
        let buffer = self.runtime.allocate_utf8(text)?;
        let slot = self.runtime.create_string_value(buffer);
        let freed = self.runtime.free(buffer);
        let slot = slot?;
        freed?;
        Ok(slot)
    }

    fn encode_blob(&mut self, bytes: &[u8]) -> MarshalResult<Ptr> {
        let buffer = self.runtime.allocate_bytes(bytes)?;
        let slot = self.runtime.create_blob_value(buffer, bytes.len() as u32);
        let freed = self.runtime.free(buffer);
        let slot = slot?;
        freed?;
        Ok(slot)
    }

    fn null(&mut self) -> MarshalResult<Ptr> {
        Ok(self.runtime.create_null_value()?)
    }
}

/// `n` as an `i32` when it is an integer in range and not negative zero.
pub(crate) fn as_int32(n: f64) -> Option<i32> {
    let integral = n.fract() == 0.0 && !(n == 0.0 && n.is_sign_negative());
    if integral && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) {
        Some(n as i32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int32_boundaries() {
        assert_eq!(as_int32(2147483647.0), Some(i32::MAX));
        assert_eq!(as_int32(2147483648.0), None);
        assert_eq!(as_int32(-2147483648.0), Some(i32::MIN));
        assert_eq!(as_int32(-2147483649.0), None);
        assert_eq!(as_int32(0.0), Some(0));
        assert_eq!(as_int32(-0.0), None);
        assert_eq!(as_int32(1.5), None);
        assert_eq!(as_int32(f64::NAN), None);
        assert_eq!(as_int32(f64::INFINITY), None);
    }
}
