//! JSON-lines record input.
//!
//! One record per line:
//!
//! ```json
//! {"topic":"orders","partition":0,"offset":7,
//!  "schema":[{"name":"ID","type":"string"}],
//!  "value":{"ID":"1"},"shape":"struct"}
//! ```
//!
//! `shape` defaults to `map`. Blank lines are ignored.

use anyhow::{bail, Context};
use dynsink::{RecordSchema, RecordValue, SinkRecord, StructValue};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Shape {
    #[default]
    Map,
    Struct,
}

#[derive(Debug, Deserialize)]
struct InputRecord {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    partition: i32,
    #[serde(default)]
    offset: i64,
    schema: RecordSchema,
    value: Value,
    #[serde(default)]
    shape: Shape,
}

impl InputRecord {
    fn into_record(self) -> anyhow::Result<SinkRecord> {
        let value = match self.shape {
            Shape::Map => RecordValue::from(self.value),
            Shape::Struct => match &self.value {
                Value::Object(object) => {
                    RecordValue::Struct(StructValue::from_object(self.schema.clone(), object))
                }
                other => bail!("struct-shaped value must be a JSON object, got {}", other),
            },
        };
        Ok(SinkRecord::new(self.schema, value).at(self.topic, self.partition, self.offset))
    }
}

/// Parse JSON-lines content into records.
pub fn parse_records(content: &str) -> anyhow::Result<Vec<SinkRecord>> {
    let mut records = Vec::new();
    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let input: InputRecord = serde_json::from_str(line)
            .with_context(|| format!("invalid record on line {}", number + 1))?;
        let record = input
            .into_record()
            .with_context(|| format!("invalid record on line {}", number + 1))?;
        records.push(record);
    }
    Ok(records)
}
