//! Field extraction from record values.
//!
//! Reads a named field out of a structured or mapping-shaped value and
//! coerces it to text. Any other shape is a type mismatch.
//!
//! The two ways a field can be absent are reported differently:
//!
//! | value shape | lookup result          | error                                |
//! |-------------|------------------------|--------------------------------------|
//! | map         | no entry / null entry  | [`ExtractError::MissingNestedField`] |
//! | struct      | null / undeclared      | [`ExtractError::FieldNotFound`]      |

use serde_json::Value;

use crate::core::RecordValue;
use crate::error::ExtractError;

/// Raw value of `field_name`, with the absence rules applied.
pub fn get_value<'a>(value: &'a RecordValue, field_name: &str) -> Result<&'a Value, ExtractError> {
    match value {
        RecordValue::Struct(s) => match s.get(field_name) {
            Some(v) if !v.is_null() => Ok(v),
            _ => Err(ExtractError::FieldNotFound {
                field: field_name.to_string(),
                value: s.to_string(),
            }),
        },
        RecordValue::Map(m) => match m.get(field_name) {
            Some(v) if !v.is_null() => Ok(v),
            _ => Err(ExtractError::MissingNestedField {
                field: field_name.to_string(),
            }),
        },
        RecordValue::Other(other) => Err(ExtractError::TypeMismatch {
            field: field_name.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Field value coerced to its textual representation.
pub fn get(value: &RecordValue, field_name: &str) -> Result<String, ExtractError> {
    get_value(value, field_name).map(to_text)
}

/// Values of `field_names`, in the same order.
///
/// Fails on the first field that cannot be read.
pub fn get_all<S: AsRef<str>>(
    value: &RecordValue,
    field_names: &[S],
) -> Result<Vec<String>, ExtractError> {
    field_names
        .iter()
        .map(|name| get(value, name.as_ref()))
        .collect()
}

/// Text form of a JSON value: strings verbatim, everything else as compact JSON.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldType, RecordSchema, StructValue};
    use serde_json::json;

    fn struct_value() -> RecordValue {
        let schema = RecordSchema::strings(["ID", "AMOUNT"]).with_field("PAID", FieldType::Boolean);
        RecordValue::Struct(StructValue::new(schema).with("ID", "1").with("PAID", true))
    }

    fn map_value() -> RecordValue {
        RecordValue::from(json!({"ID": "2", "QTY": 5, "TAGS": ["a", "b"], "GONE": null}))
    }

    #[test]
    fn test_get_from_struct() {
        assert_eq!(get(&struct_value(), "ID").unwrap(), "1");
        assert_eq!(get(&struct_value(), "PAID").unwrap(), "true");
    }

    #[test]
    fn test_get_from_map_coerces_to_text() {
        let value = map_value();
        assert_eq!(get(&value, "ID").unwrap(), "2");
        assert_eq!(get(&value, "QTY").unwrap(), "5");
        assert_eq!(get(&value, "TAGS").unwrap(), "[\"a\",\"b\"]");
    }

    #[test]
    fn test_struct_null_is_field_not_found() {
        let err = get(&struct_value(), "AMOUNT").unwrap_err();
        assert!(matches!(err, ExtractError::FieldNotFound { ref field, .. } if field == "AMOUNT"));
    }

    #[test]
    fn test_struct_undeclared_is_field_not_found() {
        let err = get(&struct_value(), "NOPE").unwrap_err();
        assert!(matches!(err, ExtractError::FieldNotFound { .. }));
    }

    #[test]
    fn test_map_absent_is_missing_nested_field() {
        let err = get(&map_value(), "AMOUNT").unwrap_err();
        assert_eq!(
            err,
            ExtractError::MissingNestedField {
                field: "AMOUNT".into()
            }
        );
    }

    #[test]
    fn test_map_null_is_missing_nested_field() {
        let err = get(&map_value(), "GONE").unwrap_err();
        assert!(matches!(err, ExtractError::MissingNestedField { .. }));
    }

    #[test]
    fn test_absence_kinds_are_distinct() {
        let from_map = get(&map_value(), "AMOUNT").unwrap_err();
        let from_struct = get(&struct_value(), "AMOUNT").unwrap_err();
        assert_ne!(
            std::mem::discriminant(&from_map),
            std::mem::discriminant(&from_struct)
        );
    }

    #[test]
    fn test_other_shape_is_type_mismatch() {
        let err = get(&RecordValue::from(json!("just a string")), "ID").unwrap_err();
        match err {
            ExtractError::TypeMismatch { field, value } => {
                assert_eq!(field, "ID");
                assert_eq!(value, "\"just a string\"");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_get_all_preserves_order() {
        let value = map_value();
        assert_eq!(get_all(&value, &["QTY", "ID"]).unwrap(), vec!["5", "2"]);
        assert!(get_all(&value, &["ID", "AMOUNT"]).is_err());
    }
}
