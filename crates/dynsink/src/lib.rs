//! # dynsink
//!
//! Schema-reconciling batch writer for change records.
//!
//! Records arrive with their own schema; the writer keeps the target table
//! in step with them:
//!
//! - **Create on demand**: a missing table is created with a single identity key
//! - **Additive evolution**: every unknown field becomes a new column
//! - **Batched inserts**: one transaction per batch, per-record outcomes
//! - **Two typing modes**: all-`VARCHAR` compatibility or native column types
//!
//! ## Example
//!
//! ```rust,no_run
//! use dynsink::{Config, RecordSchema, SchemaSyncWriter, SinkRecord};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let writer = SchemaSyncWriter::from_config(&config).await?;
//!     let record = SinkRecord::new(
//!         RecordSchema::strings(["ID", "AMOUNT"]),
//!         json!({"ID": "1", "AMOUNT": "9.99"}),
//!     );
//!     let report = writer.write("APP.ORDERS", &[record]).await?;
//!     println!("Inserted {} records", report.inserted_count());
//!     Ok(())
//! }
//! ```

pub mod binding;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod extract;
pub mod writer;

// Re-exports for convenient access
pub use binding::{Binder, TypeMode};
pub use config::{Config, TargetConfig, WriterConfig};
pub use crate::core::{
    ConnectionProvider, FieldType, RecordField, RecordSchema, RecordValue, SinkRecord, SqlValue,
    StructValue, TableId,
};
pub use drivers::{MemoryCatalog, PostgresProvider};
pub use error::{ExtractError, Result, SinkError};
pub use writer::{RecordOutcome, RecordStatus, SchemaSyncWriter, TableExistence, WriteReport};
