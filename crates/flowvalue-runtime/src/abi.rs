//! Export names, function indices and type indices of the runtime module.
//!
//! The module has no imports, so function indices start at 0.

// ── Export names ─────────────────────────────────────────────────────────────

pub const EXPORT_MEMORY: &str = "memory";
pub const EXPORT_MALLOC: &str = "_malloc";
pub const EXPORT_FREE: &str = "_free";
pub const EXPORT_CREATE_UNDEFINED: &str = "_createUndefinedValue";
pub const EXPORT_CREATE_NULL: &str = "_createNullValue";
pub const EXPORT_CREATE_BOOLEAN: &str = "_createBooleanValue";
pub const EXPORT_CREATE_INT: &str = "_createIntValue";
pub const EXPORT_CREATE_DOUBLE: &str = "_createDoubleValue";
pub const EXPORT_CREATE_DATE: &str = "_createDateValue";
pub const EXPORT_CREATE_STREAM: &str = "_createStreamValue";
pub const EXPORT_CREATE_STRING: &str = "_createStringValue";
pub const EXPORT_CREATE_BLOB: &str = "_createBlobValue";
pub const EXPORT_CREATE_ARRAY: &str = "_createArrayValue";
pub const EXPORT_ARRAY_SET_ELEMENT: &str = "_arrayValueSetElementValue";
pub const EXPORT_VALUE_FREE: &str = "_valueFree";
pub const EXPORT_LIVE_ALLOCATIONS: &str = "_liveAllocations";

// ── Function indices ─────────────────────────────────────────────────────────
// (order must match emission in module.rs)

/// `malloc(size: i32) -> i32`, 0 when memory is exhausted.
pub const FN_MALLOC: u32 = 0;
/// `free(ptr: i32)`
pub const FN_FREE: u32 = 1;
/// `alloc_slot(tag: i32) -> i32` (internal)
pub const FN_ALLOC_SLOT: u32 = 2;
/// `createUndefinedValue() -> i32`
pub const FN_CREATE_UNDEFINED: u32 = 3;
/// `createNullValue() -> i32`
pub const FN_CREATE_NULL: u32 = 4;
/// `createBooleanValue(b: i32) -> i32`
pub const FN_CREATE_BOOLEAN: u32 = 5;
/// `createIntValue(v: i32) -> i32`
pub const FN_CREATE_INT: u32 = 6;
/// `createDoubleValue(v: f64) -> i32`
pub const FN_CREATE_DOUBLE: u32 = 7;
/// `createDateValue(ms: f64) -> i32`
pub const FN_CREATE_DATE: u32 = 8;
/// `createStreamValue(handle: i32) -> i32`
pub const FN_CREATE_STREAM: u32 = 9;
/// `strlen(ptr: i32) -> i32` (internal)
pub const FN_STRLEN: u32 = 10;
/// `copy(dst: i32, src: i32, len: i32)` (internal)
pub const FN_COPY: u32 = 11;
/// `createStringValue(text: i32) -> i32`
pub const FN_CREATE_STRING: u32 = 12;
/// `createBlobValue(data: i32, len: i32) -> i32`
pub const FN_CREATE_BLOB: u32 = 13;
/// `createArrayValue(size: i32, type_index: i32) -> i32`
pub const FN_CREATE_ARRAY: u32 = 14;
/// `release_payload(slot: i32)` (internal, recursive)
pub const FN_RELEASE_PAYLOAD: u32 = 15;
/// `arrayValueSetElementValue(array: i32, index: i32, value: i32)`
pub const FN_ARRAY_SET_ELEMENT: u32 = 16;
/// `valueFree(slot: i32)`
pub const FN_VALUE_FREE: u32 = 17;
/// `liveAllocations() -> i32`
pub const FN_LIVE_ALLOCATIONS: u32 = 18;

/// Total number of functions.
pub const FN_COUNT: u32 = 19;

// ── Type indices ─────────────────────────────────────────────────────────────

/// `(i32) -> i32`
pub const TYPE_I32_I32: u32 = 0;
/// `(i32) -> ()`
pub const TYPE_I32_VOID: u32 = 1;
/// `() -> i32`
pub const TYPE_VOID_I32: u32 = 2;
/// `(f64) -> i32`
pub const TYPE_F64_I32: u32 = 3;
/// `(i32, i32) -> i32`
pub const TYPE_I32X2_I32: u32 = 4;
/// `(i32, i32, i32) -> ()`
pub const TYPE_I32X3_VOID: u32 = 5;

// ── Globals ──────────────────────────────────────────────────────────────────

/// Bump pointer: next free byte.
pub const GLOBAL_HEAP_PTR: u32 = 0;
/// Number of allocations not yet freed.
pub const GLOBAL_LIVE: u32 = 1;
