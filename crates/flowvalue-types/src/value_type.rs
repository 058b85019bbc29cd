//! Value-type names as they appear in the catalog and in decoded results.

pub const UNDEFINED: &str = "undefined";
pub const NULL: &str = "null";
pub const BOOLEAN: &str = "boolean";
pub const INTEGER: &str = "integer";
pub const FLOAT: &str = "float";
pub const DOUBLE: &str = "double";
pub const STRING: &str = "string";
pub const DATE: &str = "date";
pub const BLOB: &str = "blob";
pub const STREAM: &str = "stream";

/// Prefix of sequence types, e.g. `array:integer`.
pub const ARRAY_PREFIX: &str = "array:";

/// `true` for `array:<element>` names.
pub fn is_array_type(value_type: &str) -> bool {
    value_type.starts_with(ARRAY_PREFIX)
}

/// Element type of an `array:<element>` name.
pub fn array_element_type(value_type: &str) -> Option<&str> {
    value_type.strip_prefix(ARRAY_PREFIX)
}

/// `array:<element>`.
pub fn array_of(element: &str) -> String {
    format!("{ARRAY_PREFIX}{element}")
}

/// Basic types whose textual host values are coerced by numeric parse.
pub fn is_numeric(value_type: &str) -> bool {
    matches!(value_type, FLOAT | DOUBLE | INTEGER)
}
