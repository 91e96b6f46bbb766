//! Column types and value binding keyed by a field's semantic type.
//!
//! Two policies exist:
//!
//! - [`TypeMode::Compat`]: every column is a `VARCHAR(n)` and every value is
//!   bound as text. This matches tables written by earlier sink versions.
//! - [`TypeMode::Typed`]: columns use the dialect's native type for the
//!   declared field type, and integers, floats and booleans are bound as
//!   native literals. Values that do not fit their declared type fall back
//!   to text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{Dialect, FieldType, SqlValue};
use crate::extract::to_text;

/// Default length of compatibility-mode string columns.
pub const DEFAULT_VARCHAR_LENGTH: u32 = 255;

/// How field types map to columns and values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeMode {
    /// Everything is VARCHAR text.
    #[default]
    Compat,
    /// Native column types and literals.
    Typed,
}

/// Column type and value binder for one writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binder {
    mode: TypeMode,
    varchar_length: u32,
}

impl Default for Binder {
    fn default() -> Self {
        Self::new(TypeMode::Compat, DEFAULT_VARCHAR_LENGTH)
    }
}

impl Binder {
    pub fn new(mode: TypeMode, varchar_length: u32) -> Self {
        Self {
            mode,
            varchar_length,
        }
    }

    pub fn mode(&self) -> TypeMode {
        self.mode
    }

    /// SQL type for a new column holding `field_type`.
    pub fn column_type(&self, dialect: &dyn Dialect, field_type: FieldType) -> String {
        match self.mode {
            TypeMode::Compat => dialect.varchar_type(self.varchar_length),
            TypeMode::Typed => dialect.column_type(field_type),
        }
    }

    /// Bind an extracted value for insertion.
    pub fn bind(&self, field_type: FieldType, value: &Value) -> SqlValue {
        match self.mode {
            TypeMode::Compat => SqlValue::Text(to_text(value)),
            TypeMode::Typed => bind_typed(field_type, value),
        }
    }
}

fn bind_typed(field_type: FieldType, value: &Value) -> SqlValue {
    if value.is_null() {
        return SqlValue::Null;
    }

    let text = to_text(value);
    if field_type.is_integer() {
        if let Some(v) = value.as_i64().or_else(|| text.trim().parse().ok()) {
            return SqlValue::I64(v);
        }
    } else if field_type.is_float() {
        if let Some(v) = value.as_f64().or_else(|| text.trim().parse().ok()) {
            return SqlValue::F64(v);
        }
    } else if field_type == FieldType::Boolean {
        if let Some(v) = value
            .as_bool()
            .or_else(|| text.trim().to_ascii_lowercase().parse().ok())
        {
            return SqlValue::Bool(v);
        }
    }

    SqlValue::Text(text)
}
