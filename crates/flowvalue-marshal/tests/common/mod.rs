//! Shared fixtures for the marshalling tests.

#![allow(dead_code)]

use flowvalue_runtime::abi::*;
use flowvalue_runtime::emit_runtime_module;
use flowvalue_types::layout::SLOT_SIZE;
use flowvalue_types::{FlowRuntime, Ptr, RuntimeError, RuntimeResult, TypeCatalog, TypeIndex};
use wasmi::{Engine, Instance, Linker, Memory, Module, Store, WasmParams, WasmResults};

// ══════════════════════════════════════════════════════════════════════════════
// Catalog
// ══════════════════════════════════════════════════════════════════════════════

pub const ASSETS_JSON: &str = r#"{
  "types": [
    { "kind": "basic",  "valueType": "integer" },
    { "kind": "basic",  "valueType": "double" },
    { "kind": "basic",  "valueType": "string" },
    { "kind": "object", "valueType": "struct:Point",
      "fields": [ { "name": "x", "valueType": "double" },
                  { "name": "y", "valueType": "double" } ] },
    { "kind": "array",  "valueType": "array:integer", "elementType": "integer" },
    { "kind": "array",  "valueType": "array:struct:Point",
      "elementType": { "valueType": "struct:Point" } },
    { "kind": "object", "valueType": "struct:Line",
      "fields": [ { "name": "name", "valueType": "string" },
                  { "name": "from", "valueType": "struct:Point" },
                  { "name": "to",   "valueType": "struct:Point" } ] },
    { "kind": "array",  "valueType": "array:any", "elementType": "any" }
  ],
  "typeIndexes": {
    "integer": 0, "double": 1, "string": 2, "struct:Point": 3,
    "array:integer": 4, "array:struct:Point": 5, "struct:Line": 6,
    "array:any": 7
  }
}"#;

pub const INTEGER: TypeIndex = TypeIndex(0);
pub const DOUBLE: TypeIndex = TypeIndex(1);
pub const STRING: TypeIndex = TypeIndex(2);
pub const POINT: TypeIndex = TypeIndex(3);
pub const INT_ARRAY: TypeIndex = TypeIndex(4);
pub const POINT_ARRAY: TypeIndex = TypeIndex(5);
pub const LINE: TypeIndex = TypeIndex(6);
pub const ANY_ARRAY: TypeIndex = TypeIndex(7);

pub fn catalog() -> TypeCatalog {
    TypeCatalog::from_json(ASSETS_JSON).expect("test catalog parses")
}

// ══════════════════════════════════════════════════════════════════════════════
// Wasm-backed runtime
// ══════════════════════════════════════════════════════════════════════════════

/// The emitted runtime module, driven through wasmi.
pub struct WasmiRuntime {
    store: Store<()>,
    instance: Instance,
    memory: Memory,
}

impl WasmiRuntime {
    pub fn new() -> Self {
        let wasm = emit_runtime_module().expect("runtime module failed to build");
        let engine = Engine::default();
        let module = Module::new(&engine, &wasm[..]).expect("failed to parse wasm module");
        let mut store = Store::new(&engine, ());
        let linker = Linker::<()>::new(&engine);
        let instance = linker
            .instantiate(&mut store, &module)
            .expect("failed to instantiate")
            .start(&mut store)
            .expect("failed to start instance");
        let memory = instance
            .get_memory(&store, EXPORT_MEMORY)
            .expect("memory export missing");
        Self {
            store,
            instance,
            memory,
        }
    }

    pub fn live_allocations(&mut self) -> usize {
        self.call::<(), i32>(EXPORT_LIVE_ALLOCATIONS, ())
            .map(|n| n as usize)
            .unwrap_or(usize::MAX)
    }

    fn call<P: WasmParams, R: WasmResults>(&mut self, name: &str, args: P) -> RuntimeResult<R> {
        let func = self
            .instance
            .get_typed_func::<P, R>(&self.store, name)
            .map_err(|e| RuntimeError::Trap(format!("{name}: {e}")))?;
        func.call(&mut self.store, args)
            .map_err(|e| RuntimeError::Trap(format!("{name}: {e}")))
    }

    /// Call a primitive returning a pointer; 0 means memory is exhausted.
    fn call_ptr<P: WasmParams>(&mut self, name: &str, args: P, requested: u32) -> RuntimeResult<Ptr> {
        match self.call::<P, i32>(name, args)? {
            0 => Err(RuntimeError::OutOfMemory { requested }),
            ptr => Ok(Ptr(ptr as u32)),
        }
    }
}

impl FlowRuntime for WasmiRuntime {
    fn memory(&self) -> &[u8] {
        self.memory.data(&self.store)
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.memory.data_mut(&mut self.store)
    }

    fn malloc(&mut self, size: u32) -> RuntimeResult<Ptr> {
        self.call_ptr(EXPORT_MALLOC, size as i32, size)
    }

    fn free(&mut self, ptr: Ptr) -> RuntimeResult<()> {
        self.call(EXPORT_FREE, ptr.0 as i32)
    }

    fn create_undefined_value(&mut self) -> RuntimeResult<Ptr> {
        self.call_ptr(EXPORT_CREATE_UNDEFINED, (), SLOT_SIZE)
    }

    fn create_null_value(&mut self) -> RuntimeResult<Ptr> {
        self.call_ptr(EXPORT_CREATE_NULL, (), SLOT_SIZE)
    }

    fn create_boolean_value(&mut self, value: bool) -> RuntimeResult<Ptr> {
        self.call_ptr(EXPORT_CREATE_BOOLEAN, i32::from(value), SLOT_SIZE)
    }

    fn create_int_value(&mut self, value: i32) -> RuntimeResult<Ptr> {
        self.call_ptr(EXPORT_CREATE_INT, value, SLOT_SIZE)
    }

    fn create_double_value(&mut self, value: f64) -> RuntimeResult<Ptr> {
        self.call_ptr(EXPORT_CREATE_DOUBLE, value, SLOT_SIZE)
    }

    fn create_string_value(&mut self, text: Ptr) -> RuntimeResult<Ptr> {
        self.call_ptr(EXPORT_CREATE_STRING, text.0 as i32, SLOT_SIZE)
    }

    fn create_date_value(&mut self, millis: f64) -> RuntimeResult<Ptr> {
        self.call_ptr(EXPORT_CREATE_DATE, millis, SLOT_SIZE)
    }

    fn create_stream_value(&mut self, handle: u32) -> RuntimeResult<Ptr> {
        self.call_ptr(EXPORT_CREATE_STREAM, handle as i32, SLOT_SIZE)
    }

    fn create_blob_value(&mut self, data: Ptr, len: u32) -> RuntimeResult<Ptr> {
        self.call_ptr(EXPORT_CREATE_BLOB, (data.0 as i32, len as i32), len)
    }

    fn create_array_value(&mut self, size: u32, type_index: u32) -> RuntimeResult<Ptr> {
        self.call_ptr(
            EXPORT_CREATE_ARRAY,
            (size as i32, type_index as i32),
            size.saturating_mul(SLOT_SIZE),
        )
    }

    fn array_value_set_element_value(
        &mut self,
        array: Ptr,
        index: u32,
        value: Ptr,
    ) -> RuntimeResult<()> {
        self.call(
            EXPORT_ARRAY_SET_ELEMENT,
            (array.0 as i32, index as i32, value.0 as i32),
        )
    }

    fn value_free(&mut self, value: Ptr) -> RuntimeResult<()> {
        self.call(EXPORT_VALUE_FREE, value.0 as i32)
    }
}
