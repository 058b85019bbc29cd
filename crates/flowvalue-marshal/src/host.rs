//! The host-side value model.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use flowvalue_types::value_type;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// A dynamic host value.
///
/// Records keep their fields in order; that order is what the catalog's
/// field order is matched against when a record is decoded, and what a host
/// sees when it iterates one.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    /// An integer wider than `f64` can hold exactly (decoded 64-bit slots).
    BigInt(i128),
    String(String),
    /// Milliseconds since the Unix epoch.
    Date(f64),
    Blob(Vec<u8>),
    Array(Vec<HostValue>),
    Object(Vec<(String, HostValue)>),
    /// An opaque host object, such as a byte stream.
    Resource(Resource),
}

impl HostValue {
    /// Build a record from `(name, value)` pairs, keeping their order.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, HostValue)>,
    {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Field `name` of a record; `None` for missing fields and non-records.
    pub fn get(&self, name: &str) -> Option<&HostValue> {
        match self {
            Self::Object(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::BigInt(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Whether this is `Undefined` or `Null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Short description of the value's shape, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::Blob(_) => "blob",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Resource(_) => "resource",
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for HostValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(items: Vec<HostValue>) -> Self {
        Self::Array(items)
    }
}

impl From<Resource> for HostValue {
    fn from(r: Resource) -> Self {
        Self::Resource(r)
    }
}

/// JSON rendering for hosts and inspectors. `Undefined` and resources have
/// no JSON form and render as `null`; dates render as epoch milliseconds and
/// blobs as byte arrays.
impl Serialize for HostValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Undefined | Self::Null | Self::Resource(_) => serializer.serialize_unit(),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Number(n) | Self::Date(n) => serializer.serialize_f64(*n),
            Self::BigInt(i) => serializer.serialize_i128(*i),
            Self::String(s) => serializer.serialize_str(s),
            Self::Blob(bytes) => {
                let mut seq = serializer.serialize_seq(Some(bytes.len()))?;
                for b in bytes {
                    seq.serialize_element(b)?;
                }
                seq.end()
            }
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Resources
// ══════════════════════════════════════════════════════════════════════════════

/// A shared handle to an opaque host object.
///
/// Equality is identity: two `Resource`s are equal when they refer to the
/// same allocation, whatever its contents.
#[derive(Clone)]
pub struct Resource(Rc<dyn Any>);

impl Resource {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    pub fn from_rc<T: Any>(rc: Rc<T>) -> Self {
        Self(rc)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Address of the shared allocation; stable while any clone is alive.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn same_object(&self, other: &Resource) -> bool {
        self.identity() == other.identity()
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.same_object(other)
    }
}

impl Eq for Resource {}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resource({:#x})", self.identity())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// ValueWithType
// ══════════════════════════════════════════════════════════════════════════════

/// A decoded value and its value-type name (`"integer"`, `"string"`,
/// `"array:double"`, an object type name, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueWithType {
    pub value: HostValue,
    pub value_type: String,
}

impl ValueWithType {
    pub fn new(value: HostValue, value_type: impl Into<String>) -> Self {
        Self {
            value,
            value_type: value_type.into(),
        }
    }

    /// `{ value: undefined, valueType: "undefined" }`
    pub fn undefined() -> Self {
        Self::new(HostValue::Undefined, value_type::UNDEFINED)
    }

    pub fn is_undefined(&self) -> bool {
        self.value.is_undefined() && self.value_type == value_type::UNDEFINED
    }
}
