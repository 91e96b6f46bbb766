//! Core abstractions shared by the writer and the drivers.
//!
//! - [`identifier`]: parsed table identifiers, validation and quoting
//! - [`record`]: change records, their schemas and payload shapes
//! - [`value`]: SQL values bound into inserts
//! - [`statement`]: statements as data, rendered by a dialect
//! - [`traits`]: connection, provider and dialect seams
//!
//! # Architecture
//!
//! The writer only talks to [`ConnectionProvider`] and [`Dialect`]; driver
//! modules (`drivers/postgres`, `drivers/memory`) implement them. This keeps
//! the reconciliation logic testable against an in-memory catalog.

pub mod identifier;
pub mod record;
pub mod statement;
pub mod traits;
pub mod value;

pub use identifier::{normalize_column, validate_identifier, TableId, MAX_IDENTIFIER_LENGTH};
pub use record::{FieldType, RecordField, RecordSchema, RecordValue, SinkRecord, StructValue};
pub use statement::Statement;
pub use traits::{ColumnDescriptor, Connection, ConnectionProvider, Dialect};
pub use value::SqlValue;
