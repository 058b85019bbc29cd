//! Field accessors for host object types.
//!
//! Some host objects expose their fields through accessor functions instead
//! of plain properties. An [`ObjectVariableType`] lists one
//! [`ValueFieldDescription`] per catalog field, in catalog order; encoding
//! with it reads each field through its accessor.

use std::fmt;
use std::rc::Rc;

use crate::host::HostValue;

type FieldAccessor = Rc<dyn Fn(&HostValue) -> HostValue>;

/// Accessors for every field of an object type.
#[derive(Debug, Clone, Default)]
pub struct ObjectVariableType {
    pub value_field_descriptions: Vec<ValueFieldDescription>,
}

impl ObjectVariableType {
    pub fn new(value_field_descriptions: Vec<ValueFieldDescription>) -> Self {
        Self {
            value_field_descriptions,
        }
    }
}

/// The declared type of a described field.
#[derive(Debug, Clone)]
pub enum FieldValueType {
    /// A type name; structured fields are encoded without accessors.
    Basic(String),
    /// Accessors for the fields of a nested structured value. For array
    /// types the first description's list applies to every element.
    Nested(Vec<ValueFieldDescription>),
}

#[derive(Clone)]
pub struct ValueFieldDescription {
    pub name: String,
    pub value_type: FieldValueType,
    get_field_value: FieldAccessor,
}

impl ValueFieldDescription {
    pub fn new(
        name: impl Into<String>,
        value_type: FieldValueType,
        get_field_value: impl Fn(&HostValue) -> HostValue + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            value_type,
            get_field_value: Rc::new(get_field_value),
        }
    }

    /// A description that reads the same-named property of a record.
    pub fn property(name: impl Into<String>, value_type: FieldValueType) -> Self {
        let name = name.into();
        let key = name.clone();
        Self::new(name, value_type, move |object| {
            object.get(&key).cloned().unwrap_or_default()
        })
    }

    /// Read this field out of `object`.
    pub fn field_value(&self, object: &HostValue) -> HostValue {
        (self.get_field_value)(object)
    }

    /// Descriptions for the nested value, when this field has them.
    pub fn nested(&self) -> Option<&[ValueFieldDescription]> {
        match &self.value_type {
            FieldValueType::Nested(descriptions) => Some(descriptions),
            FieldValueType::Basic(_) => None,
        }
    }
}

impl fmt::Debug for ValueFieldDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueFieldDescription")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .finish_non_exhaustive()
    }
}
