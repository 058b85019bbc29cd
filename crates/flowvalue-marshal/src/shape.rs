//! One walk over catalog types, shared by staging and decoding.

use flowvalue_types::{value_type, FieldDescriptor, TypeDescriptor, TypeKind};

/// How the slots of an array block map onto a catalog type.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Shape<'c> {
    /// Any number of slots, all of `element_type`. Covers `array` kind and,
    /// for blocks tagged with a basic type, `basic` kind.
    Sequence { element_type: &'c str },
    /// One slot per field, in catalog order.
    Record {
        type_name: &'c str,
        fields: &'c [FieldDescriptor],
    },
}

/// One slot position visited by a walk.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Member<'c> {
    pub index: usize,
    /// Field name, for records.
    pub name: Option<&'c str>,
    pub value_type: &'c str,
}

impl<'c> Shape<'c> {
    pub(crate) fn of(descriptor: &'c TypeDescriptor) -> Self {
        match descriptor.kind {
            TypeKind::Basic => Self::Sequence {
                element_type: &descriptor.value_type,
            },
            TypeKind::Array => Self::Sequence {
                element_type: descriptor
                    .element_type
                    .as_deref()
                    .or_else(|| value_type::array_element_type(&descriptor.value_type))
                    .unwrap_or(&descriptor.value_type),
            },
            TypeKind::Object => Self::Record {
                type_name: &descriptor.value_type,
                fields: &descriptor.fields,
            },
        }
    }

    /// Value type reported for a decoded value of this shape.
    pub(crate) fn value_type(&self) -> String {
        match self {
            Self::Sequence { element_type } => value_type::array_of(element_type),
            Self::Record { type_name, .. } => (*type_name).to_string(),
        }
    }

    /// Whether a decode narrowed to `expected` may produce this shape.
    /// Sequences pass when any array type is expected; records only when
    /// their own type name is.
    pub(crate) fn accepts(&self, expected: &[&str]) -> bool {
        match self {
            Self::Sequence { .. } => expected.iter().any(|t| value_type::is_array_type(t)),
            Self::Record { type_name, .. } => expected.contains(type_name),
        }
    }

    /// Number of members the catalog requires, if fixed.
    pub(crate) fn required_len(&self) -> Option<usize> {
        match self {
            Self::Sequence { .. } => None,
            Self::Record { fields, .. } => Some(fields.len()),
        }
    }

    /// Members of a block holding `available` slots. Records never yield
    /// more members than they have fields.
    pub(crate) fn members(&self, available: usize) -> Vec<Member<'c>> {
        match *self {
            Self::Sequence { element_type } => (0..available)
                .map(|index| Member {
                    index,
                    name: None,
                    value_type: element_type,
                })
                .collect(),
            Self::Record { fields, .. } => fields
                .iter()
                .take(available)
                .enumerate()
                .map(|(index, field)| Member {
                    index,
                    name: Some(field.name.as_str()),
                    value_type: &field.value_type,
                })
                .collect(),
        }
    }
}
