//! Change records as delivered by the upstream record source.
//!
//! A [`SinkRecord`] carries a value payload and the schema declared for that
//! value. The payload is either a structured value (declared fields, typed
//! access, nullable) or a loosely typed key/value mapping.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Semantic type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Boolean,
    String,
    Bytes,
    Array,
    Map,
    Struct,
}

impl FieldType {
    /// Whether values of this type are integral numbers.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            FieldType::Int8 | FieldType::Int16 | FieldType::Int32 | FieldType::Int64
        )
    }

    /// Whether values of this type are floating point numbers.
    pub fn is_float(self) -> bool {
        matches!(self, FieldType::Float32 | FieldType::Float64)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Int8 => "INT8",
            FieldType::Int16 => "INT16",
            FieldType::Int32 => "INT32",
            FieldType::Int64 => "INT64",
            FieldType::Float32 => "FLOAT32",
            FieldType::Float64 => "FLOAT64",
            FieldType::Boolean => "BOOLEAN",
            FieldType::String => "STRING",
            FieldType::Bytes => "BYTES",
            FieldType::Array => "ARRAY",
            FieldType::Map => "MAP",
            FieldType::Struct => "STRUCT",
        };
        f.write_str(name)
    }
}

/// One declared field of a record schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl RecordField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Ordered field declarations of a record value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSchema {
    fields: Vec<RecordField>,
}

impl RecordSchema {
    pub fn new(fields: Vec<RecordField>) -> Self {
        Self { fields }
    }

    /// Schema where every field is a string, in the given order.
    pub fn strings<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|n| RecordField::new(n, FieldType::String))
                .collect(),
        )
    }

    /// Append a field declaration.
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(RecordField::new(name, field_type));
        self
    }

    pub fn fields(&self) -> &[RecordField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&RecordField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A structured value: one slot per declared field, any of which may be null.
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    schema: RecordSchema,
    values: Vec<Value>,
}

impl StructValue {
    /// Empty struct; every declared field starts out null.
    pub fn new(schema: RecordSchema) -> Self {
        let values = vec![Value::Null; schema.len()];
        Self { schema, values }
    }

    /// Build from a JSON object, taking declared fields in schema order.
    /// Keys not declared by the schema are ignored; declared keys that are
    /// absent stay null.
    pub fn from_object(schema: RecordSchema, object: &Map<String, Value>) -> Self {
        let values = schema
            .fields()
            .iter()
            .map(|f| object.get(&f.name).cloned().unwrap_or(Value::Null))
            .collect();
        Self { schema, values }
    }

    /// Set a declared field. Returns `false` when the schema has no such field.
    pub fn put(&mut self, name: &str, value: impl Into<Value>) -> bool {
        match self.schema.position(name) {
            Some(idx) => {
                self.values[idx] = value.into();
                true
            }
            None => false,
        }
    }

    /// Builder form of [`StructValue::put`]; undeclared names are ignored.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.put(name, value);
        self
    }

    /// Value of a declared field (possibly null). `None` when undeclared.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.position(name).map(|idx| &self.values[idx])
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }
}

impl fmt::Display for StructValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Struct{")?;
        let mut first = true;
        for (field, value) in self.schema.fields().iter().zip(&self.values) {
            if value.is_null() {
                continue;
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{}={}", field.name, value)?;
        }
        f.write_str("}")
    }
}

/// Payload of a change record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// Typed structured value.
    Struct(StructValue),
    /// Untyped key/value mapping.
    Map(Map<String, Value>),
    /// Anything else (scalar, array, null). Fields cannot be read from it.
    Other(Value),
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordValue::Struct(s) => write!(f, "{}", s),
            RecordValue::Map(m) => write!(f, "{}", Value::Object(m.clone())),
            RecordValue::Other(v) => write!(f, "{}", v),
        }
    }
}

impl From<StructValue> for RecordValue {
    fn from(value: StructValue) -> Self {
        RecordValue::Struct(value)
    }
}

impl From<Map<String, Value>> for RecordValue {
    fn from(value: Map<String, Value>) -> Self {
        RecordValue::Map(value)
    }
}

impl From<Value> for RecordValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => RecordValue::Map(map),
            other => RecordValue::Other(other),
        }
    }
}

/// A change record with its value schema and source coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub value_schema: RecordSchema,
    pub value: RecordValue,
}

impl SinkRecord {
    pub fn new(value_schema: RecordSchema, value: impl Into<RecordValue>) -> Self {
        Self {
            topic: String::new(),
            partition: 0,
            offset: 0,
            value_schema,
            value: value.into(),
        }
    }

    /// Set topic/partition/offset coordinates.
    pub fn at(mut self, topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        self.topic = topic.into();
        self.partition = partition;
        self.offset = offset;
        self
    }

    /// Structured record whose struct schema equals the value schema.
    pub fn from_struct(value: StructValue) -> Self {
        let schema = value.schema().clone();
        Self::new(schema, value)
    }
}
