//! The type descriptor catalog.
//!
//! For every runtime type index the catalog records whether values of that
//! type are basic, arrays (with an element type) or objects (with an ordered
//! field list). It is built outside this workspace and shipped to the host
//! as part of the assets map:
//!
//! ```json
//! {
//!   "types": [
//!     { "kind": "object", "valueType": "struct:Point",
//!       "fields": [ { "name": "x", "valueType": "double" },
//!                   { "name": "y", "valueType": "double" } ] },
//!     { "kind": "array", "valueType": "array:struct:Point",
//!       "elementType": { "valueType": "struct:Point" } }
//!   ],
//!   "typeIndexes": { "struct:Point": 0, "array:struct:Point": 1 }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Index of a type in the catalog; the value stored at offset +4 of an array
/// block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeIndex(pub u32);

impl fmt::Display for TypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shape of a catalog type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Basic,
    Array,
    Object,
}

/// One named field of an object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    pub value_type: String,
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    pub value_type: String,
    /// Element type name, for `array` kind.
    #[serde(
        default,
        deserialize_with = "deserialize_element_type",
        skip_serializing_if = "Option::is_none"
    )]
    pub element_type: Option<String>,
    /// Fields in declaration order, for `object` kind.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn basic(value_type: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Basic,
            value_type: value_type.into(),
            element_type: None,
            fields: Vec::new(),
        }
    }

    pub fn array(value_type: impl Into<String>, element_type: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Array,
            value_type: value_type.into(),
            element_type: Some(element_type.into()),
            fields: Vec::new(),
        }
    }

    pub fn object(value_type: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            kind: TypeKind::Object,
            value_type: value_type.into(),
            element_type: None,
            fields,
        }
    }

    /// Position of the field called `name`.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// `elementType` is either a bare name or `{ "valueType": name }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ElementTypeRepr {
    Name(String),
    Ref {
        #[serde(rename = "valueType")]
        value_type: String,
    },
}

fn deserialize_element_type<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<ElementTypeRepr>::deserialize(deserializer)?;
    Ok(repr.map(|r| match r {
        ElementTypeRepr::Name(name) => name,
        ElementTypeRepr::Ref { value_type } => value_type,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCatalog {
    types: Vec<TypeDescriptor>,
    #[serde(default)]
    type_indexes: Option<HashMap<String, u32>>,
}

/// Read-only (once built) lookup from type index to descriptor and from
/// value-type name to type index.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    types: Vec<TypeDescriptor>,
    type_indexes: HashMap<String, TypeIndex>,
}

impl TypeCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the assets-map JSON. When `typeIndexes` is absent it is derived
    /// from each entry's `valueType`.
    pub fn from_json(json: &str) -> CatalogResult<Self> {
        let raw: RawCatalog = serde_json::from_str(json)?;
        let count = raw.types.len();
        let type_indexes = match raw.type_indexes {
            Some(indexes) => {
                let mut out = HashMap::with_capacity(indexes.len());
                for (name, index) in indexes {
                    if index as usize >= count {
                        return Err(CatalogError::IndexOutOfRange { name, index, count });
                    }
                    out.insert(name, TypeIndex(index));
                }
                out
            }
            None => raw
                .types
                .iter()
                .enumerate()
                .map(|(i, t)| (t.value_type.clone(), TypeIndex(i as u32)))
                .collect(),
        };
        Ok(Self {
            types: raw.types,
            type_indexes,
        })
    }

    /// Append a descriptor and register its name. Returns its index.
    pub fn push(&mut self, descriptor: TypeDescriptor) -> TypeIndex {
        let index = TypeIndex(self.types.len() as u32);
        self.type_indexes
            .insert(descriptor.value_type.clone(), index);
        self.types.push(descriptor);
        index
    }

    pub fn push_basic(&mut self, value_type: &str) -> TypeIndex {
        self.push(TypeDescriptor::basic(value_type))
    }

    pub fn push_array(&mut self, value_type: &str, element_type: &str) -> TypeIndex {
        self.push(TypeDescriptor::array(value_type, element_type))
    }

    /// Append an object type from `(name, value_type)` pairs.
    pub fn push_object(&mut self, value_type: &str, fields: &[(&str, &str)]) -> TypeIndex {
        let fields = fields
            .iter()
            .map(|(name, ty)| FieldDescriptor {
                name: (*name).to_string(),
                value_type: (*ty).to_string(),
            })
            .collect();
        self.push(TypeDescriptor::object(value_type, fields))
    }

    pub fn get(&self, index: TypeIndex) -> Option<&TypeDescriptor> {
        self.types.get(index.0 as usize)
    }

    pub fn index_of(&self, value_type: &str) -> Option<TypeIndex> {
        self.type_indexes.get(value_type).copied()
    }

    /// Descriptor registered under `value_type`.
    pub fn lookup(&self, value_type: &str) -> Option<(TypeIndex, &TypeDescriptor)> {
        let index = self.index_of(value_type)?;
        self.get(index).map(|d| (index, d))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeIndex, &TypeDescriptor)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (TypeIndex(i as u32), t))
    }
}
