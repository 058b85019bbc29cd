//! Tests for the native runtime.
//!
//! Tests validate:
//! - Slot layout of every constructor
//! - String and blob copies owned by ref boxes
//! - Array element replacement and reference counting
//! - Recursive release and allocation accounting
//! - Error reporting for invalid frees, writes and exhausted memory

use flowvalue_runtime::{HeapRuntime, HEAP_START};
use flowvalue_types::layout::{self, BLOB_LEN_OFFSET, REF_DATA_OFFSET};
use flowvalue_types::{FlowRuntime, MemoryView, Ptr, RuntimeError, ValueTag};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn tag_of(rt: &HeapRuntime, slot: Ptr) -> u8 {
    MemoryView::new(rt.memory()).read_u8(slot).unwrap()
}

fn payload_ptr(rt: &HeapRuntime, slot: Ptr) -> Ptr {
    MemoryView::new(rt.memory())
        .read_ptr(layout::payload(slot))
        .unwrap()
}

fn string_text(rt: &HeapRuntime, slot: Ptr) -> String {
    let view = MemoryView::new(rt.memory());
    let ref_box = view.read_ptr(layout::payload(slot)).unwrap();
    let text = view.read_ptr(ref_box.add(REF_DATA_OFFSET)).unwrap();
    view.read_c_str(text).unwrap()
}

fn element(rt: &HeapRuntime, array: Ptr, index: u32) -> Ptr {
    layout::element_slot(layout::ref_array_block(payload_ptr(rt, array)), index)
}

// ══════════════════════════════════════════════════════════════════════════════
// Scalars
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_scalar_slots() {
    let mut rt = HeapRuntime::new();
    let u = rt.create_undefined_value().unwrap();
    let n = rt.create_null_value().unwrap();
    let b = rt.create_boolean_value(true).unwrap();
    let i = rt.create_int_value(-42).unwrap();
    let d = rt.create_double_value(2.5).unwrap();
    let t = rt.create_date_value(1_700_000_000_000.0).unwrap();
    let s = rt.create_stream_value(7).unwrap();

    let view = MemoryView::new(rt.memory());
    assert_eq!(view.read_u8(u).unwrap(), ValueTag::Undefined.byte());
    assert_eq!(view.read_u8(n).unwrap(), ValueTag::Null.byte());
    assert_eq!(view.read_u8(b).unwrap(), ValueTag::Boolean.byte());
    assert_eq!(view.read_i32(layout::payload(b)).unwrap(), 1);
    assert_eq!(view.read_u8(i).unwrap(), ValueTag::Int32.byte());
    assert_eq!(view.read_i32(layout::payload(i)).unwrap(), -42);
    assert_eq!(view.read_u8(d).unwrap(), ValueTag::Double.byte());
    assert_eq!(view.read_f64(layout::payload(d)).unwrap(), 2.5);
    assert_eq!(view.read_u8(t).unwrap(), ValueTag::Date.byte());
    assert_eq!(
        view.read_f64(layout::payload(t)).unwrap(),
        1_700_000_000_000.0
    );
    assert_eq!(view.read_u8(s).unwrap(), ValueTag::Stream.byte());
    assert_eq!(view.read_u32(layout::payload(s)).unwrap(), 7);
}

#[test]
fn test_first_allocation_at_heap_start() {
    let mut rt = HeapRuntime::new();
    assert_eq!(rt.create_null_value().unwrap(), Ptr(HEAP_START));
}

#[test]
fn test_scalar_free_balances() {
    let mut rt = HeapRuntime::new();
    let v = rt.create_double_value(1.0).unwrap();
    assert_eq!(rt.live_allocations(), 1);
    rt.value_free(v).unwrap();
    assert_eq!(rt.live_allocations(), 0);
}

// ══════════════════════════════════════════════════════════════════════════════
// Strings and blobs
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_string_is_copied() {
    let mut rt = HeapRuntime::new();
    let tmp = rt.allocate_utf8("héllo").unwrap();
    let s = rt.create_string_value(tmp).unwrap();
    rt.free(tmp).unwrap();

    assert_eq!(tag_of(&rt, s), ValueTag::StringRef.byte());
    assert_eq!(rt.ref_count(s).unwrap(), 1);
    assert_eq!(string_text(&rt, s), "héllo");

    // slot + box + buffer
    assert_eq!(rt.live_allocations(), 3);
    rt.value_free(s).unwrap();
    assert_eq!(rt.live_allocations(), 0);
}

#[test]
fn test_empty_string() {
    let mut rt = HeapRuntime::new();
    let tmp = rt.allocate_utf8("").unwrap();
    let s = rt.create_string_value(tmp).unwrap();
    rt.free(tmp).unwrap();
    assert_eq!(string_text(&rt, s), "");
}

#[test]
fn test_unterminated_string_is_rejected() {
    let mut rt = HeapRuntime::with_capacity(HEAP_START + 64);
    let buf = rt.malloc(64).unwrap();
    rt.memory_mut()[buf.as_usize()..].fill(b'x');
    assert!(matches!(
        rt.create_string_value(buf),
        Err(RuntimeError::Memory(_))
    ));
}

#[test]
fn test_blob_records_length() {
    let mut rt = HeapRuntime::new();
    let data = rt.allocate_bytes(&[1, 2, 3, 0, 5]).unwrap();
    let b = rt.create_blob_value(data, 5).unwrap();
    rt.free(data).unwrap();

    let view = MemoryView::new(rt.memory());
    let ref_box = view.read_ptr(layout::payload(b)).unwrap();
    assert_eq!(view.read_u8(b).unwrap(), ValueTag::BlobRef.byte());
    assert_eq!(view.read_u32(ref_box.add(BLOB_LEN_OFFSET)).unwrap(), 5);
    let bytes_at = view.read_ptr(ref_box.add(REF_DATA_OFFSET)).unwrap();
    assert_eq!(view.read_bytes(bytes_at, 5).unwrap(), vec![1, 2, 3, 0, 5]);

    rt.value_free(b).unwrap();
    assert_eq!(rt.live_allocations(), 0);
}

#[test]
fn test_empty_blob() {
    let mut rt = HeapRuntime::new();
    let data = rt.allocate_bytes(&[]).unwrap();
    let b = rt.create_blob_value(data, 0).unwrap();
    rt.free(data).unwrap();
    rt.value_free(b).unwrap();
    assert_eq!(rt.live_allocations(), 0);
}

// ══════════════════════════════════════════════════════════════════════════════
// Arrays
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_new_array_elements_are_undefined() {
    let mut rt = HeapRuntime::new();
    let a = rt.create_array_value(3, 9).unwrap();
    let block = layout::ref_array_block(payload_ptr(&rt, a));
    let view = MemoryView::new(rt.memory());
    assert_eq!(view.read_u32(block).unwrap(), 3);
    assert_eq!(view.read_u32(block.add(4)).unwrap(), 9);
    for i in 0..3 {
        let el = layout::element_slot(block, i);
        assert_eq!(view.read_u8(el).unwrap(), ValueTag::Undefined.byte());
    }
}

#[test]
fn test_set_element_copies_scalar() {
    let mut rt = HeapRuntime::new();
    let a = rt.create_array_value(2, 0).unwrap();
    let v = rt.create_int_value(5).unwrap();
    rt.array_value_set_element_value(a, 1, v).unwrap();
    rt.value_free(v).unwrap();

    let el = element(&rt, a, 1);
    let view = MemoryView::new(rt.memory());
    assert_eq!(view.read_u8(el).unwrap(), ValueTag::Int32.byte());
    assert_eq!(view.read_i32(layout::payload(el)).unwrap(), 5);
}

#[test]
fn test_set_element_shares_string_box() {
    let mut rt = HeapRuntime::new();
    let a = rt.create_array_value(1, 0).unwrap();
    let tmp = rt.allocate_utf8("shared").unwrap();
    let s = rt.create_string_value(tmp).unwrap();
    rt.free(tmp).unwrap();

    rt.array_value_set_element_value(a, 0, s).unwrap();
    assert_eq!(rt.ref_count(s).unwrap(), 2);

    rt.value_free(s).unwrap();
    let el = element(&rt, a, 0);
    assert_eq!(rt.ref_count(el).unwrap(), 1);
    assert_eq!(string_text(&rt, el), "shared");

    rt.value_free(a).unwrap();
    assert_eq!(rt.live_allocations(), 0);
}

#[test]
fn test_replacing_element_releases_old_value() {
    let mut rt = HeapRuntime::new();
    let a = rt.create_array_value(1, 0).unwrap();
    let tmp = rt.allocate_utf8("old").unwrap();
    let s = rt.create_string_value(tmp).unwrap();
    rt.free(tmp).unwrap();
    rt.array_value_set_element_value(a, 0, s).unwrap();
    rt.value_free(s).unwrap();

    let before = rt.live_allocations();
    let n = rt.create_null_value().unwrap();
    rt.array_value_set_element_value(a, 0, n).unwrap();
    rt.value_free(n).unwrap();
    // string box and buffer released
    assert_eq!(rt.live_allocations(), before - 2);
}

#[test]
fn test_nested_arrays_release_recursively() {
    let mut rt = HeapRuntime::new();
    let outer = rt.create_array_value(2, 0).unwrap();
    for i in 0..2 {
        let inner = rt.create_array_value(1, 1).unwrap();
        let tmp = rt.allocate_utf8("leaf").unwrap();
        let s = rt.create_string_value(tmp).unwrap();
        rt.free(tmp).unwrap();
        rt.array_value_set_element_value(inner, 0, s).unwrap();
        rt.value_free(s).unwrap();
        rt.array_value_set_element_value(outer, i, inner).unwrap();
        rt.value_free(inner).unwrap();
    }
    assert!(rt.live_allocations() > 0);
    rt.value_free(outer).unwrap();
    assert_eq!(rt.live_allocations(), 0);
    assert_eq!(rt.live_bytes(), 0);
}

#[test]
fn test_set_element_out_of_range() {
    let mut rt = HeapRuntime::new();
    let a = rt.create_array_value(1, 0).unwrap();
    let v = rt.create_null_value().unwrap();
    assert!(matches!(
        rt.array_value_set_element_value(a, 1, v),
        Err(RuntimeError::InvalidValue { .. })
    ));
}

#[test]
fn test_set_element_on_non_array() {
    let mut rt = HeapRuntime::new();
    let not_array = rt.create_int_value(0).unwrap();
    let v = rt.create_null_value().unwrap();
    assert!(matches!(
        rt.array_value_set_element_value(not_array, 0, v),
        Err(RuntimeError::InvalidValue { .. })
    ));
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_value_double_free_detected() {
    let mut rt = HeapRuntime::new();
    let v = rt.create_null_value().unwrap();
    rt.value_free(v).unwrap();
    assert_eq!(rt.value_free(v), Err(RuntimeError::InvalidFree(v)));
}

#[test]
fn test_out_of_memory_leaves_nothing_allocated() {
    let mut rt = HeapRuntime::with_capacity(HEAP_START + 16);
    let tmp_len = "abc".len() as u32 + 1;
    assert!(tmp_len <= 8);
    let tmp = rt.allocate_utf8("abc").unwrap();
    // buffer fits, box does not
    assert!(matches!(
        rt.create_string_value(tmp),
        Err(RuntimeError::OutOfMemory { .. })
    ));
    assert_eq!(rt.live_allocations(), 1);
}

#[test]
fn test_huge_array_is_out_of_memory() {
    let mut rt = HeapRuntime::new();
    assert!(matches!(
        rt.create_array_value(u32::MAX, 0),
        Err(RuntimeError::OutOfMemory { .. })
    ));
}
