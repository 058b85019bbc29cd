//! Staging of structured host values.
//!
//! Before anything is written into runtime memory, an array or record is
//! flattened into an [`ArrayValue`]: the catalog type index plus one
//! [`StagedValue`] per slot, in slot order. Records are laid out in catalog
//! field order, whatever order the host object lists its fields in.

use flowvalue_types::{value_type, TypeCatalog, TypeIndex, TypeKind};

use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::host::HostValue;
use crate::object_type::ValueFieldDescription;
use crate::shape::Shape;

/// A structured value ready to be written as an array block.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    pub type_index: TypeIndex,
    pub values: Vec<StagedValue>,
}

/// One slot of a staged block.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedValue {
    /// Encoded as a single slot.
    Value(HostValue),
    /// Encoded as a nested array block.
    Nested(ArrayValue),
}

pub struct Stager<'a> {
    catalog: &'a TypeCatalog,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Stager<'a> {
    pub fn new(catalog: &'a TypeCatalog, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            catalog,
            diagnostics,
        }
    }

    /// Stage `value` as the structured type `type_index`.
    ///
    /// Returns `None`, after reporting a diagnostic, when the type is unknown
    /// or basic, or when the value's shape does not fit it. The caller
    /// substitutes `Null`.
    pub fn stage(
        &mut self,
        type_index: TypeIndex,
        value: &HostValue,
        descriptions: Option<&[ValueFieldDescription]>,
    ) -> Option<ArrayValue> {
        let catalog = self.catalog;
        let Some(descriptor) = catalog.get(type_index) else {
            self.diagnostics.report(
                DiagnosticKind::UnknownType,
                format!("no catalog entry for type {type_index}"),
            );
            return None;
        };
        if descriptor.kind == TypeKind::Basic {
            self.diagnostics.report(
                DiagnosticKind::TypeMismatch,
                format!(
                    "type {} is basic and cannot hold a structured value",
                    descriptor.value_type
                ),
            );
            return None;
        }

        let shape = Shape::of(descriptor);
        let values = match shape {
            Shape::Sequence { .. } => {
                let HostValue::Array(items) = value else {
                    self.mismatch(&descriptor.value_type, value);
                    return None;
                };
                let element_descriptions = descriptions
                    .and_then(|d| d.first())
                    .and_then(ValueFieldDescription::nested);
                shape
                    .members(items.len())
                    .into_iter()
                    .zip(items)
                    .map(|(member, item)| {
                        self.stage_member(member.value_type, item, element_descriptions)
                    })
                    .collect()
            }
            Shape::Record { .. } => {
                if descriptions.is_none() && !matches!(value, HostValue::Object(_)) {
                    self.mismatch(&descriptor.value_type, value);
                    return None;
                }
                let members = shape.members(usize::MAX);
                let mut values = Vec::with_capacity(members.len());
                for member in members {
                    let (raw, nested) = match descriptions {
                        Some(descriptions) => match descriptions.get(member.index) {
                            Some(d) => (d.field_value(value), d.nested()),
                            None => {
                                self.diagnostics.report(
                                    DiagnosticKind::UnsupportedValue,
                                    format!(
                                        "no accessor for field {} of {}",
                                        member.name.unwrap_or_default(),
                                        descriptor.value_type
                                    ),
                                );
                                (HostValue::Undefined, None)
                            }
                        },
                        None => (
                            member
                                .name
                                .and_then(|name| value.get(name))
                                .cloned()
                                .unwrap_or_default(),
                            None,
                        ),
                    };
                    values.push(self.stage_member(member.value_type, &raw, nested));
                }
                values
            }
        };

        Some(ArrayValue { type_index, values })
    }

    /// Stage one slot whose declared type is `type_name`.
    fn stage_member(
        &mut self,
        type_name: &str,
        value: &HostValue,
        descriptions: Option<&[ValueFieldDescription]>,
    ) -> StagedValue {
        let catalog = self.catalog;
        match catalog.lookup(type_name) {
            Some((index, descriptor)) if descriptor.kind != TypeKind::Basic => {
                if value.is_nullish() {
                    return StagedValue::Value(value.clone());
                }
                match self.stage(index, value, descriptions) {
                    Some(array) => StagedValue::Nested(array),
                    None => StagedValue::Value(HostValue::Null),
                }
            }
            _ => StagedValue::Value(coerce(type_name, value)),
        }
    }

    fn mismatch(&mut self, type_name: &str, value: &HostValue) {
        self.diagnostics.report(
            DiagnosticKind::TypeMismatch,
            format!("cannot encode {} as {type_name}", value.kind_name()),
        );
    }
}

/// Textual values declared as `float`, `double` or `integer` become numbers.
pub(crate) fn coerce(type_name: &str, value: &HostValue) -> HostValue {
    match value {
        HostValue::String(text) if value_type::is_numeric(type_name) => {
            HostValue::Number(parse_float(text))
        }
        _ => value.clone(),
    }
}

/// Parse the longest numeric prefix of `text` (after leading whitespace),
/// `NaN` when there is none.
pub(crate) fn parse_float(text: &str) -> f64 {
    let text = text.trim_start();
    let unsigned = text.trim_start_matches(['+', '-']);
    let sign_len = text.len() - unsigned.len();
    if sign_len <= 1 && unsigned.starts_with("Infinity") {
        return if text.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let bytes = text.as_bytes();
    let mut end = sign_len.min(1);
    let digits_from = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut has_digits = end > digits_from;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_from = end + 1;
        let mut frac_end = frac_from;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if has_digits || frac_end > frac_from {
            has_digits = true;
            end = frac_end;
        }
    }
    if !has_digits {
        return f64::NAN;
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    text[..end].parse().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_float_prefixes() {
        assert_eq!(parse_float("42"), 42.0);
        assert_eq!(parse_float("  -3.5kg"), -3.5);
        assert_eq!(parse_float("1e3x"), 1000.0);
        assert_eq!(parse_float("1e"), 1.0);
        assert_eq!(parse_float(".5"), 0.5);
        assert_eq!(parse_float("7."), 7.0);
        assert_eq!(parse_float("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float("abc").is_nan());
        assert!(parse_float("").is_nan());
        assert!(parse_float("--1").is_nan());
        assert!(parse_float(".").is_nan());
    }

    #[test]
    fn test_coerce_only_numeric_types() {
        assert_eq!(
            coerce("double", &HostValue::from("2.5")),
            HostValue::Number(2.5)
        );
        assert_eq!(
            coerce("string", &HostValue::from("2.5")),
            HostValue::from("2.5")
        );
        assert_eq!(coerce("integer", &HostValue::Null), HostValue::Null);
    }
}
