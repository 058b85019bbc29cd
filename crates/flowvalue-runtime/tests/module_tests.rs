//! Tests for the emitted runtime module.
//!
//! Tests validate:
//! - The module validates and exports every primitive
//! - Executing the primitives via wasmi produces the same memory image as
//!   the native runtime
//! - Live allocation accounting balances after release
//! - Invalid array writes trap

use flowvalue_runtime::abi::*;
use flowvalue_runtime::{emit_runtime_module, HeapRuntime, HEAP_START, RUNTIME_MEMORY_PAGES};
use flowvalue_types::{FlowRuntime, Ptr};
use wasmi::{Engine, Linker, Module, Store};
use wasmparser::{ExternalKind, Payload};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn get_exports(wasm: &[u8]) -> Vec<(String, ExternalKind)> {
    let mut exports = Vec::new();
    for payload in wasmparser::Parser::new(0).parse_all(wasm) {
        if let Ok(Payload::ExportSection(reader)) = payload {
            for export in reader.into_iter().flatten() {
                exports.push((export.name.to_string(), export.kind));
            }
        }
    }
    exports
}

fn instantiate() -> (Store<()>, wasmi::Instance) {
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
    (store, instance)
}

fn call_i32(store: &mut Store<()>, instance: &wasmi::Instance, name: &str, arg: i32) -> i32 {
    instance
        .get_typed_func::<i32, i32>(&*store, name)
        .unwrap_or_else(|_| panic!("{name} export missing"))
        .call(&mut *store, arg)
        .unwrap_or_else(|e| panic!("{name} trapped: {e}"))
}

fn call_void(store: &mut Store<()>, instance: &wasmi::Instance, name: &str, arg: i32) {
    instance
        .get_typed_func::<i32, ()>(&*store, name)
        .unwrap_or_else(|_| panic!("{name} export missing"))
        .call(&mut *store, arg)
        .unwrap_or_else(|e| panic!("{name} trapped: {e}"));
}

fn call_f64(store: &mut Store<()>, instance: &wasmi::Instance, name: &str, arg: f64) -> i32 {
    instance
        .get_typed_func::<f64, i32>(&*store, name)
        .unwrap()
        .call(&mut *store, arg)
        .unwrap()
}

fn call_pair(store: &mut Store<()>, instance: &wasmi::Instance, name: &str, a: i32, b: i32) -> i32 {
    instance
        .get_typed_func::<(i32, i32), i32>(&*store, name)
        .unwrap()
        .call(&mut *store, (a, b))
        .unwrap()
}

fn call_nullary(store: &mut Store<()>, instance: &wasmi::Instance, name: &str) -> i32 {
    instance
        .get_typed_func::<(), i32>(&*store, name)
        .unwrap()
        .call(&mut *store, ())
        .unwrap()
}

fn set_element(
    store: &mut Store<()>,
    instance: &wasmi::Instance,
    array: i32,
    index: i32,
    value: i32,
) -> Result<(), wasmi::Error> {
    instance
        .get_typed_func::<(i32, i32, i32), ()>(&*store, EXPORT_ARRAY_SET_ELEMENT)
        .unwrap()
        .call(&mut *store, (array, index, value))
}

fn write_memory(store: &mut Store<()>, instance: &wasmi::Instance, ptr: i32, bytes: &[u8]) {
    let memory = instance.get_memory(&*store, EXPORT_MEMORY).unwrap();
    let start = ptr as usize;
    memory.data_mut(&mut *store)[start..start + bytes.len()].copy_from_slice(bytes);
}

fn live(store: &mut Store<()>, instance: &wasmi::Instance) -> i32 {
    call_nullary(store, instance, EXPORT_LIVE_ALLOCATIONS)
}

// ══════════════════════════════════════════════════════════════════════════════
// Module structure
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_exports_every_primitive() {
    let wasm = emit_runtime_module().unwrap();
    let exports = get_exports(&wasm);
    let names: Vec<&str> = exports.iter().map(|(n, _)| n.as_str()).collect();
    for name in [
        EXPORT_MALLOC,
        EXPORT_FREE,
        EXPORT_CREATE_UNDEFINED,
        EXPORT_CREATE_NULL,
        EXPORT_CREATE_BOOLEAN,
        EXPORT_CREATE_INT,
        EXPORT_CREATE_DOUBLE,
        EXPORT_CREATE_DATE,
        EXPORT_CREATE_STREAM,
        EXPORT_CREATE_STRING,
        EXPORT_CREATE_BLOB,
        EXPORT_CREATE_ARRAY,
        EXPORT_ARRAY_SET_ELEMENT,
        EXPORT_VALUE_FREE,
        EXPORT_LIVE_ALLOCATIONS,
    ] {
        assert!(names.contains(&name), "missing export {name}");
    }
    assert!(exports
        .iter()
        .any(|(n, k)| n == EXPORT_MEMORY && *k == ExternalKind::Memory));
}

#[test]
fn test_emission_is_deterministic() {
    assert_eq!(emit_runtime_module().unwrap(), emit_runtime_module().unwrap());
}

#[test]
fn test_memory_size() {
    let (store, instance) = instantiate();
    let memory = instance.get_memory(&store, EXPORT_MEMORY).unwrap();
    assert_eq!(
        memory.data(&store).len() as u64,
        RUNTIME_MEMORY_PAGES * 65536
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Execution
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_memory_image_matches_native_runtime() {
    let (mut store, instance) = instantiate();
    let mut native = HeapRuntime::new();

    // wasm side
    let text = call_i32(&mut store, &instance, EXPORT_MALLOC, 6);
    write_memory(&mut store, &instance, text, b"hello\0");
    let array = call_pair(&mut store, &instance, EXPORT_CREATE_ARRAY, 4, 3);
    let s = call_i32(&mut store, &instance, EXPORT_CREATE_STRING, text);
    call_void(&mut store, &instance, EXPORT_FREE, text);
    let i = call_i32(&mut store, &instance, EXPORT_CREATE_INT, -9);
    let d = call_f64(&mut store, &instance, EXPORT_CREATE_DOUBLE, 0.5);
    let b = call_i32(&mut store, &instance, EXPORT_CREATE_BOOLEAN, 1);
    for (idx, v) in [s, i, d, b].into_iter().enumerate() {
        set_element(&mut store, &instance, array, idx as i32, v).unwrap();
        call_void(&mut store, &instance, EXPORT_VALUE_FREE, v);
    }

    // native side, same sequence
    let n_text = native.allocate_utf8("hello").unwrap();
    let n_array = native.create_array_value(4, 3).unwrap();
    let n_s = native.create_string_value(n_text).unwrap();
    native.free(n_text).unwrap();
    let n_i = native.create_int_value(-9).unwrap();
    let n_d = native.create_double_value(0.5).unwrap();
    let n_b = native.create_boolean_value(true).unwrap();
    for (idx, v) in [n_s, n_i, n_d, n_b].into_iter().enumerate() {
        native
            .array_value_set_element_value(n_array, idx as u32, v)
            .unwrap();
        native.value_free(v).unwrap();
    }

    assert_eq!(Ptr(array as u32), n_array);
    let memory = instance.get_memory(&store, EXPORT_MEMORY).unwrap();
    let wasm_bytes = memory.data(&store);
    assert_eq!(wasm_bytes.len(), native.memory().len());
    assert!(wasm_bytes == native.memory(), "memory images differ");
    assert_eq!(live(&mut store, &instance) as usize, native.live_allocations());
}

#[test]
fn test_first_allocation_at_heap_start() {
    let (mut store, instance) = instantiate();
    let slot = call_nullary(&mut store, &instance, EXPORT_CREATE_NULL);
    assert_eq!(slot as u32, HEAP_START);
}

#[test]
fn test_release_balances_live_count() {
    let (mut store, instance) = instantiate();
    let outer = call_pair(&mut store, &instance, EXPORT_CREATE_ARRAY, 2, 0);
    let inner = call_pair(&mut store, &instance, EXPORT_CREATE_ARRAY, 1, 1);
    let data = call_i32(&mut store, &instance, EXPORT_MALLOC, 3);
    write_memory(&mut store, &instance, data, &[9, 8, 7]);
    let blob = call_pair(&mut store, &instance, EXPORT_CREATE_BLOB, data, 3);
    call_void(&mut store, &instance, EXPORT_FREE, data);

    set_element(&mut store, &instance, inner, 0, blob).unwrap();
    call_void(&mut store, &instance, EXPORT_VALUE_FREE, blob);
    set_element(&mut store, &instance, outer, 0, inner).unwrap();
    set_element(&mut store, &instance, outer, 1, inner).unwrap();
    call_void(&mut store, &instance, EXPORT_VALUE_FREE, inner);
    assert!(live(&mut store, &instance) > 0);

    call_void(&mut store, &instance, EXPORT_VALUE_FREE, outer);
    assert_eq!(live(&mut store, &instance), 0);
}

#[test]
fn test_exhausted_memory_returns_null() {
    let (mut store, instance) = instantiate();
    let too_big = (RUNTIME_MEMORY_PAGES * 65536) as i32;
    assert_eq!(call_i32(&mut store, &instance, EXPORT_MALLOC, too_big), 0);
    assert_eq!(
        call_pair(&mut store, &instance, EXPORT_CREATE_ARRAY, too_big, 0),
        0
    );
    assert_eq!(live(&mut store, &instance), 0);
}

#[test]
fn test_set_element_out_of_range_traps() {
    let (mut store, instance) = instantiate();
    let array = call_pair(&mut store, &instance, EXPORT_CREATE_ARRAY, 1, 0);
    let v = call_nullary(&mut store, &instance, EXPORT_CREATE_NULL);
    assert!(set_element(&mut store, &instance, array, 1, v).is_err());
    assert!(set_element(&mut store, &instance, v, 0, v).is_err());
}
