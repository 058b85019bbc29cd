//! Per-session marshalling context.

use flowvalue_types::{CatalogResult, FlowRuntime, MemoryView, Ptr, TypeCatalog, TypeIndex};

use crate::decode::Decoder;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::encode::Encoder;
use crate::error::MarshalResult;
use crate::handles::{ResourceHandle, ResourceHandleTable};
use crate::host::{HostValue, Resource, ValueWithType};
use crate::object_type::ObjectVariableType;
use crate::staging::{ArrayValue, Stager};

/// State shared by every encode and decode of one runtime session: the type
/// catalog, the resource handle table and the diagnostics log.
///
/// Sessions are independent; two runtimes can be driven side by side with
/// their own handles.
#[derive(Debug, Default)]
pub struct MarshalSession {
    catalog: TypeCatalog,
    handles: ResourceHandleTable,
    diagnostics: Diagnostics,
}

impl MarshalSession {
    pub fn new(catalog: TypeCatalog) -> Self {
        Self {
            catalog,
            handles: ResourceHandleTable::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// A session whose catalog is read from assets-map JSON.
    pub fn from_assets_json(json: &str) -> CatalogResult<Self> {
        Ok(Self::new(TypeCatalog::from_json(json)?))
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    pub fn handles(&self) -> &ResourceHandleTable {
        &self.handles
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Remove and return the diagnostics recorded so far.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.take()
    }

    /// The resource registered under `handle`.
    pub fn resource(&self, handle: ResourceHandle) -> Option<&Resource> {
        self.handles.get(handle)
    }

    /// The handle for `resource`, registering it on first sight.
    pub fn resource_handle(&mut self, resource: &Resource) -> ResourceHandle {
        self.handles.handle_for(resource)
    }

    // ── Encode ───────────────────────────────────────────────────────────

    fn encoder<'s, R: FlowRuntime + ?Sized>(&'s mut self, runtime: &'s mut R) -> Encoder<'s, R> {
        Encoder::new(
            runtime,
            &self.catalog,
            &mut self.handles,
            &mut self.diagnostics,
        )
    }

    /// Encode `value` into a new slot. Structured values need `declared`.
    pub fn encode<R: FlowRuntime + ?Sized>(
        &mut self,
        runtime: &mut R,
        value: &HostValue,
        declared: Option<TypeIndex>,
    ) -> MarshalResult<Ptr> {
        self.encoder(runtime).encode(value, declared)
    }

    /// Encode a value carrying its own type name, such as one produced by
    /// [`decode`](Self::decode). Names missing from the catalog encode as if
    /// no type were declared.
    pub fn encode_typed<R: FlowRuntime + ?Sized>(
        &mut self,
        runtime: &mut R,
        value: &ValueWithType,
    ) -> MarshalResult<Ptr> {
        let declared = self.catalog.index_of(&value.value_type);
        self.encode(runtime, &value.value, declared)
    }

    /// Encode a host object whose fields are read through the accessors of
    /// `object_type`.
    pub fn encode_object_variable<R: FlowRuntime + ?Sized>(
        &mut self,
        runtime: &mut R,
        value: &HostValue,
        type_index: TypeIndex,
        object_type: &ObjectVariableType,
    ) -> MarshalResult<Ptr> {
        self.encoder(runtime).encode_described(
            value,
            Some(type_index),
            Some(&object_type.value_field_descriptions),
        )
    }

    /// Stage a structured value without touching runtime memory.
    pub fn stage(
        &mut self,
        type_index: TypeIndex,
        value: &HostValue,
        object_type: Option<&ObjectVariableType>,
    ) -> Option<ArrayValue> {
        Stager::new(&self.catalog, &mut self.diagnostics).stage(
            type_index,
            value,
            object_type.map(|t| t.value_field_descriptions.as_slice()),
        )
    }

    /// Write a staged value as an array block.
    pub fn create_wasm_array_value<R: FlowRuntime + ?Sized>(
        &mut self,
        runtime: &mut R,
        array: &ArrayValue,
    ) -> MarshalResult<Ptr> {
        self.encoder(runtime).create_wasm_array_value(array)
    }

    // ── Decode ───────────────────────────────────────────────────────────

    /// A decoder over a snapshot of runtime memory.
    pub fn decoder<'s>(&'s mut self, memory: &'s [u8]) -> Decoder<'s> {
        Decoder::new(
            MemoryView::new(memory),
            &self.catalog,
            &self.handles,
            &mut self.diagnostics,
        )
    }

    /// Decode the slot at `slot` in `runtime`'s memory.
    pub fn decode<R: FlowRuntime + ?Sized>(&mut self, runtime: &R, slot: Ptr) -> ValueWithType {
        self.decoder(runtime.memory()).decode_value(slot)
    }

    /// Decode the array block at `block`, narrowed to `expected_types`.
    pub fn decode_array<R: FlowRuntime + ?Sized>(
        &mut self,
        runtime: &R,
        block: Ptr,
        expected_types: Option<&[&str]>,
    ) -> ValueWithType {
        self.decoder(runtime.memory())
            .decode_array(block, expected_types)
    }

    /// Decode the slot at `slot`, or `None` when its value type is not one
    /// of `expected_types`.
    pub fn decode_expecting<R: FlowRuntime + ?Sized>(
        &mut self,
        runtime: &R,
        slot: Ptr,
        expected_types: &[&str],
    ) -> Option<ValueWithType> {
        self.decoder(runtime.memory())
            .decode_expecting(slot, expected_types)
    }

    /// Decode the expression list at `list`.
    pub fn decode_value_list<R: FlowRuntime + ?Sized>(
        &mut self,
        runtime: &R,
        list: Ptr,
    ) -> Vec<HostValue> {
        self.decoder(runtime.memory()).decode_value_list(list)
    }
}
