//! Assembly of the self-contained runtime module.
//!
//! The module exports one linear memory and the value primitives. Its memory
//! layout matches [`HeapRuntime`](crate::HeapRuntime) byte for byte: same
//! heap start, same 8-byte allocation rounding, same slot and ref-box shapes.
//! Failing allocations return 0; invalid array writes trap.

use flowvalue_types::layout::{
    ARRAY_HEADER_SIZE, BLOB_LEN_OFFSET, BLOB_REF_SIZE, PAYLOAD_OFFSET, REF_DATA_OFFSET,
    REF_HEADER_SIZE, SLOT_SIZE, STRING_REF_SIZE,
};
use flowvalue_types::ValueTag;
use wasm_encoder::{
    BlockType, CodeSection, ConstExpr, ExportKind, ExportSection, Function, FunctionSection,
    GlobalSection, GlobalType, Instruction, MemorySection, MemoryType, Module, TypeSection,
    ValType,
};

use crate::abi::*;
use crate::error::{ModuleError, ModuleResult};
use crate::heap::HEAP_START;

/// Linear memory size of the runtime module, in 64 KiB pages. The memory
/// does not grow.
pub const RUNTIME_MEMORY_PAGES: u64 = 16;

const MEMORY_BYTES: i32 = (RUNTIME_MEMORY_PAGES * 65536) as i32;

/// Offset of the first element slot from the start of an `ArrayRef` box.
const ARRAY_ELEMENTS_OFFSET: u32 = REF_HEADER_SIZE + ARRAY_HEADER_SIZE;
/// Offset of the element count from the start of an `ArrayRef` box.
const ARRAY_BOX_COUNT_OFFSET: u32 = REF_DATA_OFFSET;
/// Offset of the type index from the start of an `ArrayRef` box.
const ARRAY_BOX_TYPE_OFFSET: u32 = REF_DATA_OFFSET + 4;

const FIRST_REF_TAG: i32 = ValueTag::StringRef as i32;
const REF_TAG_SPAN: i32 = ValueTag::BlobRef as i32 - FIRST_REF_TAG;

/// Build and validate the runtime module.
pub fn emit_runtime_module() -> ModuleResult<Vec<u8>> {
    let mut module = Module::new();

    module.section(&emit_types());

    let mut functions = FunctionSection::new();
    let mut code = CodeSection::new();
    let bodies: [(u32, Function); FN_COUNT as usize] = [
        (TYPE_I32_I32, emit_malloc()),
        (TYPE_I32_VOID, emit_free()),
        (TYPE_I32_I32, emit_alloc_slot()),
        (TYPE_VOID_I32, emit_create_tag_only(ValueTag::Undefined)),
        (TYPE_VOID_I32, emit_create_tag_only(ValueTag::Null)),
        (TYPE_I32_I32, emit_create_boolean()),
        (TYPE_I32_I32, emit_create_i32(ValueTag::Int32)),
        (TYPE_F64_I32, emit_create_f64(ValueTag::Double)),
        (TYPE_F64_I32, emit_create_f64(ValueTag::Date)),
        (TYPE_I32_I32, emit_create_i32(ValueTag::Stream)),
        (TYPE_I32_I32, emit_strlen()),
        (TYPE_I32X3_VOID, emit_copy()),
        (TYPE_I32_I32, emit_create_string()),
        (TYPE_I32X2_I32, emit_create_blob()),
        (TYPE_I32X2_I32, emit_create_array()),
        (TYPE_I32_VOID, emit_release_payload()),
        (TYPE_I32X3_VOID, emit_array_set_element()),
        (TYPE_I32_VOID, emit_value_free()),
        (TYPE_VOID_I32, emit_live_allocations()),
    ];
    for (ty, body) in &bodies {
        functions.function(*ty);
        code.function(body);
    }
    module.section(&functions);

    let mut memory = MemorySection::new();
    memory.memory(MemoryType {
        minimum: RUNTIME_MEMORY_PAGES,
        maximum: Some(RUNTIME_MEMORY_PAGES),
        memory64: false,
        shared: false,
        page_size_log2: None,
    });
    module.section(&memory);

    module.section(&emit_globals());
    module.section(&emit_exports());
    module.section(&code);

    let wasm_bytes = module.finish();
    wasmparser::validate(&wasm_bytes)
        .map_err(|e| ModuleError::ValidationFailed(format!("{e}")))?;
    Ok(wasm_bytes)
}

// ══════════════════════════════════════════════════════════════════════════════
// Sections
// ══════════════════════════════════════════════════════════════════════════════

fn emit_types() -> TypeSection {
    let mut types = TypeSection::new();
    // TYPE_I32_I32
    types.ty().function(vec![ValType::I32], vec![ValType::I32]);
    // TYPE_I32_VOID
    types.ty().function(vec![ValType::I32], vec![]);
    // TYPE_VOID_I32
    types.ty().function(vec![], vec![ValType::I32]);
    // TYPE_F64_I32
    types.ty().function(vec![ValType::F64], vec![ValType::I32]);
    // TYPE_I32X2_I32
    types
        .ty()
        .function(vec![ValType::I32, ValType::I32], vec![ValType::I32]);
    // TYPE_I32X3_VOID
    types
        .ty()
        .function(vec![ValType::I32, ValType::I32, ValType::I32], vec![]);
    types
}

fn emit_globals() -> GlobalSection {
    let mut globals = GlobalSection::new();
    // GLOBAL_HEAP_PTR
    globals.global(
        GlobalType {
            val_type: ValType::I32,
            mutable: true,
            shared: false,
        },
        &ConstExpr::i32_const(HEAP_START as i32),
    );
    // GLOBAL_LIVE
    globals.global(
        GlobalType {
            val_type: ValType::I32,
            mutable: true,
            shared: false,
        },
        &ConstExpr::i32_const(0),
    );
    globals
}

fn emit_exports() -> ExportSection {
    let mut exports = ExportSection::new();
    exports.export(EXPORT_MEMORY, ExportKind::Memory, 0);
    for (name, index) in [
        (EXPORT_MALLOC, FN_MALLOC),
        (EXPORT_FREE, FN_FREE),
        (EXPORT_CREATE_UNDEFINED, FN_CREATE_UNDEFINED),
        (EXPORT_CREATE_NULL, FN_CREATE_NULL),
        (EXPORT_CREATE_BOOLEAN, FN_CREATE_BOOLEAN),
        (EXPORT_CREATE_INT, FN_CREATE_INT),
        (EXPORT_CREATE_DOUBLE, FN_CREATE_DOUBLE),
        (EXPORT_CREATE_DATE, FN_CREATE_DATE),
        (EXPORT_CREATE_STREAM, FN_CREATE_STREAM),
        (EXPORT_CREATE_STRING, FN_CREATE_STRING),
        (EXPORT_CREATE_BLOB, FN_CREATE_BLOB),
        (EXPORT_CREATE_ARRAY, FN_CREATE_ARRAY),
        (EXPORT_ARRAY_SET_ELEMENT, FN_ARRAY_SET_ELEMENT),
        (EXPORT_VALUE_FREE, FN_VALUE_FREE),
        (EXPORT_LIVE_ALLOCATIONS, FN_LIVE_ALLOCATIONS),
    ] {
        exports.export(name, ExportKind::Func, index);
    }
    exports
}

// ══════════════════════════════════════════════════════════════════════════════
// Allocator
// ══════════════════════════════════════════════════════════════════════════════

/// `malloc(size: i32) -> i32`
///
/// Bump allocator rounding every request up to 8 bytes (a zero-byte
/// request takes 8). Returns 0 instead of growing memory.
fn emit_malloc() -> Function {
    let mut f = Function::new(vec![(1, ValType::I32)]); // local 1: ptr
    // size > memory → 0 (also keeps the rounding below from wrapping)
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Const(MEMORY_BYTES));
    f.instruction(&Instruction::I32GtU);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);

    // size == 0 → 1
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::LocalSet(0));
    f.instruction(&Instruction::End);

    // size = (size + 7) & ~7
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Const(7));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Const(-8));
    f.instruction(&Instruction::I32And);
    f.instruction(&Instruction::LocalSet(0));

    // ptr = heap_ptr
    f.instruction(&Instruction::GlobalGet(GLOBAL_HEAP_PTR));
    f.instruction(&Instruction::LocalSet(1));

    // ptr + size > memory → 0
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Const(MEMORY_BYTES));
    f.instruction(&Instruction::I32GtU);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);

    // heap_ptr = ptr + size
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::GlobalSet(GLOBAL_HEAP_PTR));

    // live += 1
    f.instruction(&Instruction::GlobalGet(GLOBAL_LIVE));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::GlobalSet(GLOBAL_LIVE));

    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::End);
    f
}

/// `free(ptr: i32)`: memory is not reclaimed; only the live count drops.
fn emit_free() -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::GlobalGet(GLOBAL_LIVE));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Sub);
    f.instruction(&Instruction::GlobalSet(GLOBAL_LIVE));
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::End);
    f
}

/// `alloc_slot(tag: i32) -> i32`
fn emit_alloc_slot() -> Function {
    let mut f = Function::new(vec![(1, ValType::I32)]); // local 1: slot
    f.instruction(&Instruction::I32Const(SLOT_SIZE as i32));
    f.instruction(&Instruction::Call(FN_MALLOC));
    f.instruction(&Instruction::LocalTee(1));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);

    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Store8(memarg(0, 0)));

    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::End);
    f
}

/// `strlen(ptr: i32) -> i32`
fn emit_strlen() -> Function {
    let mut f = Function::new(vec![(1, ValType::I32)]); // local 1: i
    f.instruction(&Instruction::Block(BlockType::Empty));
    f.instruction(&Instruction::Loop(BlockType::Empty));
    // byte at ptr + i == 0 → break
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Load8U(memarg(0, 0)));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::BrIf(1));
    // i += 1
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::LocalSet(1));
    f.instruction(&Instruction::Br(0));
    f.instruction(&Instruction::End); // end loop
    f.instruction(&Instruction::End); // end block

    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::End);
    f
}

/// `copy(dst: i32, src: i32, len: i32)`, byte by byte.
fn emit_copy() -> Function {
    let mut f = Function::new(vec![(1, ValType::I32)]); // local 3: i
    f.instruction(&Instruction::Block(BlockType::Empty));
    f.instruction(&Instruction::Loop(BlockType::Empty));
    // i >= len → break
    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::I32GeU);
    f.instruction(&Instruction::BrIf(1));
    // dst[i] = src[i]
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Load8U(memarg(0, 0)));
    f.instruction(&Instruction::I32Store8(memarg(0, 0)));
    // i += 1
    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::LocalSet(3));
    f.instruction(&Instruction::Br(0));
    f.instruction(&Instruction::End); // end loop
    f.instruction(&Instruction::End); // end block
    f.instruction(&Instruction::End);
    f
}

// ══════════════════════════════════════════════════════════════════════════════
// Value constructors
// ══════════════════════════════════════════════════════════════════════════════

/// `() -> i32` for tags without a payload.
fn emit_create_tag_only(tag: ValueTag) -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::I32Const(tag as i32));
    f.instruction(&Instruction::Call(FN_ALLOC_SLOT));
    f.instruction(&Instruction::End);
    f
}

/// Allocate a slot for `tag` into `local`, returning 0 on failure.
fn alloc_slot_into(f: &mut Function, tag: ValueTag, local: u32) {
    f.instruction(&Instruction::I32Const(tag as i32));
    f.instruction(&Instruction::Call(FN_ALLOC_SLOT));
    f.instruction(&Instruction::LocalTee(local));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);
}

/// `createBooleanValue(b: i32) -> i32`; any non-zero input stores 1.
fn emit_create_boolean() -> Function {
    let mut f = Function::new(vec![(1, ValType::I32)]); // local 1: slot
    alloc_slot_into(&mut f, ValueTag::Boolean, 1);
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::I32Ne);
    f.instruction(&Instruction::I32Store(memarg(PAYLOAD_OFFSET as u64, 2)));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::End);
    f
}

/// `(v: i32) -> i32` storing a 32-bit payload.
fn emit_create_i32(tag: ValueTag) -> Function {
    let mut f = Function::new(vec![(1, ValType::I32)]); // local 1: slot
    alloc_slot_into(&mut f, tag, 1);
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Store(memarg(PAYLOAD_OFFSET as u64, 2)));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::End);
    f
}

/// `(v: f64) -> i32` storing a 64-bit float payload.
fn emit_create_f64(tag: ValueTag) -> Function {
    let mut f = Function::new(vec![(1, ValType::I32)]); // local 1: slot
    alloc_slot_into(&mut f, tag, 1);
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::F64Store(memarg(PAYLOAD_OFFSET as u64, 3)));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::End);
    f
}

/// `createStringValue(text: i32) -> i32`
///
/// Copies the NUL-terminated text (terminator included) into a new buffer
/// owned by a `StringRef` box. Partial allocations are released on failure.
fn emit_create_string() -> Function {
    // params: 0=text; locals: 1=len, 2=buf, 3=box, 4=slot
    let mut f = Function::new(vec![(4, ValType::I32)]);

    // len = strlen(text) + 1
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::Call(FN_STRLEN));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::LocalSet(1));

    emit_boxed_copy(&mut f, ValueTag::StringRef, STRING_REF_SIZE, 0, 1, 2, 3, 4);

    f.instruction(&Instruction::LocalGet(4));
    f.instruction(&Instruction::End);
    f
}

/// `createBlobValue(data: i32, len: i32) -> i32`
fn emit_create_blob() -> Function {
    // params: 0=data, 1=len; locals: 2=buf, 3=box, 4=slot
    let mut f = Function::new(vec![(3, ValType::I32)]);

    emit_boxed_copy(&mut f, ValueTag::BlobRef, BLOB_REF_SIZE, 0, 1, 2, 3, 4);

    // box.len = len
    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I32Store(memarg(BLOB_LEN_OFFSET as u64, 2)));

    f.instruction(&Instruction::LocalGet(4));
    f.instruction(&Instruction::End);
    f
}

/// Shared body of the string and blob constructors: copy `len` bytes from
/// `src` into a fresh buffer, box it with refcount 1 and point a new slot at
/// the box. Returns 0 from the enclosing function when any allocation fails.
#[allow(clippy::too_many_arguments)]
fn emit_boxed_copy(
    f: &mut Function,
    tag: ValueTag,
    box_size: u32,
    src: u32,
    len: u32,
    buf: u32,
    ref_box: u32,
    slot: u32,
) {
    // buf = malloc(len)
    f.instruction(&Instruction::LocalGet(len));
    f.instruction(&Instruction::Call(FN_MALLOC));
    f.instruction(&Instruction::LocalTee(buf));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);

    // copy(buf, src, len)
    f.instruction(&Instruction::LocalGet(buf));
    f.instruction(&Instruction::LocalGet(src));
    f.instruction(&Instruction::LocalGet(len));
    f.instruction(&Instruction::Call(FN_COPY));

    // box = malloc(box_size)
    f.instruction(&Instruction::I32Const(box_size as i32));
    f.instruction(&Instruction::Call(FN_MALLOC));
    f.instruction(&Instruction::LocalTee(ref_box));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::LocalGet(buf));
    f.instruction(&Instruction::Call(FN_FREE));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);

    // slot = alloc_slot(tag)
    f.instruction(&Instruction::I32Const(tag as i32));
    f.instruction(&Instruction::Call(FN_ALLOC_SLOT));
    f.instruction(&Instruction::LocalTee(slot));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::LocalGet(ref_box));
    f.instruction(&Instruction::Call(FN_FREE));
    f.instruction(&Instruction::LocalGet(buf));
    f.instruction(&Instruction::Call(FN_FREE));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);

    // box.refcount = 1
    f.instruction(&Instruction::LocalGet(ref_box));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Store(memarg(0, 2)));
    // box.data = buf
    f.instruction(&Instruction::LocalGet(ref_box));
    f.instruction(&Instruction::LocalGet(buf));
    f.instruction(&Instruction::I32Store(memarg(REF_DATA_OFFSET as u64, 2)));
    // slot.payload = box
    f.instruction(&Instruction::LocalGet(slot));
    f.instruction(&Instruction::LocalGet(ref_box));
    f.instruction(&Instruction::I32Store(memarg(PAYLOAD_OFFSET as u64, 2)));
}

/// `createArrayValue(size: i32, type_index: i32) -> i32`
///
/// Element slots start zeroed, i.e. tagged `Undefined`.
fn emit_create_array() -> Function {
    // params: 0=size, 1=type_index; locals: 2=box, 3=slot
    let mut f = Function::new(vec![(2, ValType::I32)]);

    // size too large for memory → 0
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Const(MEMORY_BYTES / SLOT_SIZE as i32));
    f.instruction(&Instruction::I32GtU);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);

    // box = malloc(header + size * SLOT_SIZE)
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Const(SLOT_SIZE as i32));
    f.instruction(&Instruction::I32Mul);
    f.instruction(&Instruction::I32Const(ARRAY_ELEMENTS_OFFSET as i32));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::Call(FN_MALLOC));
    f.instruction(&Instruction::LocalTee(2));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);

    // slot = alloc_slot(ArrayRef)
    f.instruction(&Instruction::I32Const(ValueTag::ArrayRef as i32));
    f.instruction(&Instruction::Call(FN_ALLOC_SLOT));
    f.instruction(&Instruction::LocalTee(3));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::Call(FN_FREE));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);

    // box.refcount = 1
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Store(memarg(0, 2)));
    // block.count = size
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Store(memarg(ARRAY_BOX_COUNT_OFFSET as u64, 2)));
    // block.type = type_index
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I32Store(memarg(ARRAY_BOX_TYPE_OFFSET as u64, 2)));
    // slot.payload = box
    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::I32Store(memarg(PAYLOAD_OFFSET as u64, 2)));

    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::End);
    f
}

// ══════════════════════════════════════════════════════════════════════════════
// Reference counting
// ══════════════════════════════════════════════════════════════════════════════

/// Push `1` if the tag in `local` is a ref tag, else `0`.
fn is_ref_tag(f: &mut Function, local: u32) {
    f.instruction(&Instruction::LocalGet(local));
    f.instruction(&Instruction::I32Const(FIRST_REF_TAG));
    f.instruction(&Instruction::I32Sub);
    f.instruction(&Instruction::I32Const(REF_TAG_SPAN));
    f.instruction(&Instruction::I32LeU);
}

/// `release_payload(slot: i32)`
///
/// Drops one reference to the slot's box. At zero, array children are
/// released recursively, string/blob buffers are freed, then the box.
fn emit_release_payload() -> Function {
    // params: 0=slot; locals: 1=tag, 2=box, 3=count, 4=i
    let mut f = Function::new(vec![(4, ValType::I32)]);

    // tag = slot.tag; not a ref → return
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Load8U(memarg(0, 0)));
    f.instruction(&Instruction::LocalSet(1));
    is_ref_tag(&mut f, 1);
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);

    // box = slot.payload
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Load(memarg(PAYLOAD_OFFSET as u64, 2)));
    f.instruction(&Instruction::LocalSet(2));

    // count = box.refcount - 1; box.refcount = count
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::I32Load(memarg(0, 2)));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Sub);
    f.instruction(&Instruction::LocalTee(3));
    f.instruction(&Instruction::I32Store(memarg(0, 2)));

    // still referenced → return
    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);

    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I32Const(ValueTag::ArrayRef as i32));
    f.instruction(&Instruction::I32Eq);
    f.instruction(&Instruction::If(BlockType::Empty));
    {
        // count = block.count; release every element
        f.instruction(&Instruction::LocalGet(2));
        f.instruction(&Instruction::I32Load(memarg(ARRAY_BOX_COUNT_OFFSET as u64, 2)));
        f.instruction(&Instruction::LocalSet(3));
        f.instruction(&Instruction::Block(BlockType::Empty));
        f.instruction(&Instruction::Loop(BlockType::Empty));
        f.instruction(&Instruction::LocalGet(4));
        f.instruction(&Instruction::LocalGet(3));
        f.instruction(&Instruction::I32GeU);
        f.instruction(&Instruction::BrIf(1));
        // release_payload(box + ELEMENTS + i * SLOT_SIZE)
        f.instruction(&Instruction::LocalGet(2));
        f.instruction(&Instruction::LocalGet(4));
        f.instruction(&Instruction::I32Const(SLOT_SIZE as i32));
        f.instruction(&Instruction::I32Mul);
        f.instruction(&Instruction::I32Add);
        f.instruction(&Instruction::I32Const(ARRAY_ELEMENTS_OFFSET as i32));
        f.instruction(&Instruction::I32Add);
        f.instruction(&Instruction::Call(FN_RELEASE_PAYLOAD));
        // i += 1
        f.instruction(&Instruction::LocalGet(4));
        f.instruction(&Instruction::I32Const(1));
        f.instruction(&Instruction::I32Add);
        f.instruction(&Instruction::LocalSet(4));
        f.instruction(&Instruction::Br(0));
        f.instruction(&Instruction::End); // end loop
        f.instruction(&Instruction::End); // end block
    }
    f.instruction(&Instruction::Else);
    {
        // free(box.data)
        f.instruction(&Instruction::LocalGet(2));
        f.instruction(&Instruction::I32Load(memarg(REF_DATA_OFFSET as u64, 2)));
        f.instruction(&Instruction::Call(FN_FREE));
    }
    f.instruction(&Instruction::End);

    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::Call(FN_FREE));
    f.instruction(&Instruction::End);
    f
}

/// `arrayValueSetElementValue(array: i32, index: i32, value: i32)`
///
/// Releases the element being replaced, copies the value's 16 bytes in and
/// takes a reference when the copied payload is boxed. Traps when `array`
/// is not an `ArrayRef` or `index` is out of range.
fn emit_array_set_element() -> Function {
    // params: 0=array, 1=index, 2=value; locals: 3=box, 4=dst, 5=tag
    let mut f = Function::new(vec![(3, ValType::I32)]);

    // array.tag != ArrayRef → trap
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Load8U(memarg(0, 0)));
    f.instruction(&Instruction::I32Const(ValueTag::ArrayRef as i32));
    f.instruction(&Instruction::I32Ne);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::Unreachable);
    f.instruction(&Instruction::End);

    // box = array.payload
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Load(memarg(PAYLOAD_OFFSET as u64, 2)));
    f.instruction(&Instruction::LocalSet(3));

    // index >= block.count → trap
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::I32Load(memarg(ARRAY_BOX_COUNT_OFFSET as u64, 2)));
    f.instruction(&Instruction::I32GeU);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::Unreachable);
    f.instruction(&Instruction::End);

    // dst = box + ELEMENTS + index * SLOT_SIZE
    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I32Const(SLOT_SIZE as i32));
    f.instruction(&Instruction::I32Mul);
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Const(ARRAY_ELEMENTS_OFFSET as i32));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::LocalSet(4));

    f.instruction(&Instruction::LocalGet(4));
    f.instruction(&Instruction::Call(FN_RELEASE_PAYLOAD));

    f.instruction(&Instruction::LocalGet(4));
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::I32Const(SLOT_SIZE as i32));
    f.instruction(&Instruction::Call(FN_COPY));

    // retain: ref tag → box.refcount += 1
    f.instruction(&Instruction::LocalGet(4));
    f.instruction(&Instruction::I32Load8U(memarg(0, 0)));
    f.instruction(&Instruction::LocalSet(5));
    is_ref_tag(&mut f, 5);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::LocalGet(4));
    f.instruction(&Instruction::I32Load(memarg(PAYLOAD_OFFSET as u64, 2)));
    f.instruction(&Instruction::LocalTee(3));
    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::I32Load(memarg(0, 2)));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Store(memarg(0, 2)));
    f.instruction(&Instruction::End);

    f.instruction(&Instruction::End);
    f
}

/// `valueFree(slot: i32)`
fn emit_value_free() -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);

    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::Call(FN_RELEASE_PAYLOAD));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::Call(FN_FREE));
    f.instruction(&Instruction::End);
    f
}

/// `liveAllocations() -> i32`
fn emit_live_allocations() -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::GlobalGet(GLOBAL_LIVE));
    f.instruction(&Instruction::End);
    f
}

fn memarg(offset: u64, align: u32) -> wasm_encoder::MemArg {
    wasm_encoder::MemArg {
        offset,
        align,
        memory_index: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_validates() {
        let bytes = emit_runtime_module().unwrap();
        assert_eq!(&bytes[0..4], b"\0asm");
    }

    #[test]
    fn test_memory_matches_heap_default() {
        assert_eq!(MEMORY_BYTES as u32, 1 << 20);
    }
}
