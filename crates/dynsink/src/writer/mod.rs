//! Schema-synchronizing batch writer.
//!
//! [`SchemaSyncWriter::write`] runs the whole pipeline for one batch:
//!
//! 1. parse the table identifier (a malformed one fails before any I/O)
//! 2. check whether the table exists and create it if not
//! 3. reconcile every record's schema against the table
//! 4. extract every record's values and queue an insert
//! 5. execute the queued inserts in one transaction and commit
//!
//! Schema changes (steps 2 and 3) are committed independently of the insert
//! transaction and are not undone when it fails. Each step holds at most one
//! connection at a time, so a single-connection pool is enough.

pub mod batch;
pub mod cache;
pub mod creator;
pub mod existence;
pub mod reconcile;
pub mod report;

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::binding::Binder;
use crate::config::{Config, WriterConfig};
use crate::core::{ConnectionProvider, SinkRecord, TableId};
use crate::error::{Result, SinkError};

pub use batch::{BatchInsertBuilder, PreparedBatch};
pub use cache::ColumnCache;
pub use existence::TableExistence;
pub use reconcile::{IssueKind, ReconciledField, ReconciledFields, Reconciler, SchemaIssue};
pub use report::{FailureStage, RecordOutcome, RecordStatus, WriteReport};

/// Writes record batches into tables whose shape follows the records.
pub struct SchemaSyncWriter {
    provider: Arc<dyn ConnectionProvider>,
    options: WriterConfig,
    binder: Binder,
    cache: Option<ColumnCache>,
}

impl SchemaSyncWriter {
    pub fn new(provider: Arc<dyn ConnectionProvider>, options: WriterConfig) -> Self {
        let binder = Binder::new(options.type_mode, options.varchar_length);
        let cache = options.metadata_cache_ttl().map(ColumnCache::new);
        Self {
            provider,
            options,
            binder,
            cache,
        }
    }

    /// Connect to the configured target and build a writer for it.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let provider = crate::drivers::connect(&config.target).await?;
        Ok(Self::new(provider, config.writer.clone()))
    }

    pub fn provider(&self) -> &Arc<dyn ConnectionProvider> {
        &self.provider
    }

    pub fn options(&self) -> &WriterConfig {
        &self.options
    }

    /// Existence of `table` in the target catalog.
    pub async fn probe(&self, table: &str) -> Result<TableExistence> {
        let table = TableId::parse(table)?;
        Ok(existence::probe(self.provider.as_ref(), &table).await)
    }

    /// Whether `table` is confirmed present. Malformed identifiers and any
    /// lookup failure read as `false`.
    pub async fn exists(&self, table: &str) -> bool {
        match TableId::parse(table) {
            Ok(table) => existence::exists(self.provider.as_ref(), &table).await,
            Err(_) => false,
        }
    }

    /// Drop cached column metadata for every table.
    pub fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Write `records` into `table`, evolving the table as needed.
    ///
    /// Returns `Err` when the call as a whole could not proceed: malformed or
    /// over-long identifier, no connection, table creation failure, or an existence
    /// check that failed while `create_on_unknown` is off. Everything else,
    /// including a failed commit, is described by the report.
    pub async fn write(&self, table: &str, records: &[SinkRecord]) -> Result<WriteReport> {
        let table = TableId::parse(table)?;
        table.check_for(self.provider.dialect())?;
        let mut report = WriteReport::new(table.to_string(), Utc::now());

        report.created = self.ensure_table(&table).await?;
        if report.created {
            if let Some(cache) = &self.cache {
                cache.invalidate(&table);
            }
        }

        let reconciler = Reconciler::new(self.provider.dialect(), self.binder, self.cache.as_ref());
        let builder = BatchInsertBuilder::new(&table, self.binder, reconciler);

        let batch = {
            let mut schema_conn = self.provider.connect().await?;
            builder.prepare(schema_conn.as_mut(), records).await
        };

        let mut outcomes: Vec<Option<RecordOutcome>> = vec![None; records.len()];
        for skipped in &batch.skipped {
            outcomes[skipped.index] = Some(skipped.clone());
        }

        let status = if batch.is_empty() {
            report.committed = true;
            RecordStatus::Inserted
        } else {
            // Acquired last so a write never holds two pooled connections
            let mut conn = self.provider.connect().await?;
            match builder.execute(conn.as_mut(), &batch).await {
                Ok(_) => {
                    report.committed = true;
                    RecordStatus::Inserted
                }
                Err(e) => {
                    let reason = e.to_string();
                    report.error = Some(reason.clone());
                    RecordStatus::Failed {
                        stage: FailureStage::Execution,
                        reason,
                    }
                }
            }
        };
        for &index in &batch.queued {
            outcomes[index] = Some(RecordOutcome::new(index, &records[index], status.clone()));
        }

        report.records = outcomes.into_iter().flatten().collect();
        report.columns_added = batch.columns_added;
        report.schema_issues = batch.schema_issues;
        report.finished_at = Utc::now();

        if report.failed_count() > 0 {
            warn!(
                "Wrote {}/{} records into {} ({} failed)",
                report.inserted_count(),
                records.len(),
                table,
                report.failed_count()
            );
        } else {
            info!("Wrote {} records into {}", report.inserted_count(), table);
        }

        Ok(report)
    }

    /// [`write`](Self::write) collapsed to a single flag: `true` only when
    /// every record was committed.
    pub async fn write_compat(&self, table: &str, records: &[SinkRecord]) -> bool {
        match self.write(table, records).await {
            Ok(report) => report.is_success(),
            Err(e) => {
                error!("Write into {} failed: {}", table, e);
                false
            }
        }
    }

    /// Returns `true` if this call created the table.
    async fn ensure_table(&self, table: &TableId) -> Result<bool> {
        match existence::probe(self.provider.as_ref(), table).await {
            TableExistence::Present => return Ok(false),
            TableExistence::Absent => {}
            TableExistence::Unknown(reason) => {
                if !self.options.create_on_unknown {
                    return Err(SinkError::metadata(table.to_string(), reason));
                }
                warn!(
                    "Existence of {} is unknown ({}), attempting creation",
                    table, reason
                );
            }
        }

        creator::create(self.provider.as_ref(), table, &self.options.identity_column).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::TypeMode;
    use crate::core::{
        ColumnDescriptor, Connection, Dialect, FieldType, RecordSchema, SqlValue, Statement,
        StructValue,
    };
    use crate::drivers::MemoryCatalog;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::{OwnedSemaphorePermit, Semaphore};

    fn orders() -> TableId {
        TableId::parse("APP.ORDERS").unwrap()
    }

    fn writer(catalog: &MemoryCatalog) -> SchemaSyncWriter {
        SchemaSyncWriter::new(Arc::new(catalog.clone()), WriterConfig::default())
    }

    fn order_record(id: &str, amount: &str) -> SinkRecord {
        SinkRecord::new(
            RecordSchema::strings(["ID", "AMOUNT"]),
            json!({"ID": id, "AMOUNT": amount}),
        )
    }

    #[tokio::test]
    async fn test_creates_table_and_columns() {
        let catalog = MemoryCatalog::new();
        let report = writer(&catalog)
            .write("APP.ORDERS", &[order_record("1", "9.99")])
            .await
            .unwrap();

        assert!(report.created);
        assert!(report.committed);
        assert_eq!(report.columns_added, vec!["ID", "AMOUNT"]);
        assert_eq!(
            catalog.columns(&orders()).unwrap(),
            vec!["ROW_ID", "ID", "AMOUNT"]
        );

        let rows = catalog.rows(&orders());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("ID"), Some(&SqlValue::from("1")));
        assert_eq!(rows[0].get("AMOUNT"), Some(&SqlValue::from("9.99")));
        assert_eq!(rows[0].get("ROW_ID"), Some(&SqlValue::I64(1)));
    }

    #[tokio::test]
    async fn test_adds_only_missing_column() {
        let catalog = MemoryCatalog::new().with_table(&orders(), &["ROW_ID", "ID"]);
        let report = writer(&catalog)
            .write("APP.ORDERS", &[order_record("2", "4.50")])
            .await
            .unwrap();

        assert!(!report.created);
        assert_eq!(report.columns_added, vec!["AMOUNT"]);
        assert_eq!(catalog.alteration_count(), 1);

        let rows = catalog.rows(&orders());
        assert_eq!(rows[0].get("ID"), Some(&SqlValue::from("2")));
        assert_eq!(rows[0].get("AMOUNT"), Some(&SqlValue::from("4.50")));
    }

    #[tokio::test]
    async fn test_bad_record_does_not_block_batch() {
        let catalog = MemoryCatalog::new();
        let records = vec![
            order_record("1", "1.00"),
            SinkRecord::new(RecordSchema::strings(["ID", "AMOUNT"]), json!({"ID": "2"})),
            order_record("3", "3.00"),
        ];
        let report = writer(&catalog).write("APP.ORDERS", &records).await.unwrap();

        assert!(report.committed);
        assert_eq!(report.inserted_count(), 2);
        assert_eq!(report.failed_count(), 1);
        assert!(report.records[0].is_inserted());
        assert!(!report.records[1].is_inserted());
        assert!(report.records[2].is_inserted());

        let ids: Vec<_> = catalog
            .rows(&orders())
            .iter()
            .map(|r| r.get("ID").cloned())
            .collect();
        assert_eq!(
            ids,
            vec![Some(SqlValue::from("1")), Some(SqlValue::from("3"))]
        );
    }

    #[tokio::test]
    async fn test_malformed_table_rejected_before_connecting() {
        let catalog = MemoryCatalog::new();
        let writer = writer(&catalog);
        for table in ["ORDERS", "APP.", ".ORDERS", "A.B.C", ""] {
            let err = writer.write(table, &[order_record("1", "1")]).await.unwrap_err();
            assert!(err.is_config(), "{} should be a config error", table);
        }
        assert!(!writer.write_compat("ORDERS", &[]).await);
        assert_eq!(catalog.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_existing_columns_trigger_no_alteration() {
        let catalog = MemoryCatalog::new().with_table(&orders(), &["ROW_ID", "ID", "AMOUNT"]);
        let writer = writer(&catalog);
        writer
            .write("APP.ORDERS", &[order_record("1", "1"), order_record("2", "2")])
            .await
            .unwrap();
        assert_eq!(catalog.alteration_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_failure_fails_every_queued_record() {
        let catalog = MemoryCatalog::new();
        catalog.fail_commit(true);
        let writer = writer(&catalog);
        let records = vec![order_record("1", "1"), order_record("2", "2")];
        let report = writer.write("APP.ORDERS", &records).await.unwrap();

        assert!(!report.committed);
        assert!(report.error.is_some());
        assert_eq!(report.failed_count(), 2);
        assert!(report.records.iter().all(|r| matches!(
            r.status,
            RecordStatus::Failed {
                stage: FailureStage::Execution,
                ..
            }
        )));
        // Schema changes were committed on their own
        assert!(catalog.table_exists(&orders()));
        assert!(catalog.rows(&orders()).is_empty());
        assert!(!writer.write_compat("APP.ORDERS", &records).await);
    }

    #[tokio::test]
    async fn test_unknown_existence_respects_create_on_unknown() {
        let catalog = MemoryCatalog::new().with_table(&orders(), &["ROW_ID", "ID", "AMOUNT"]);
        catalog.fail_metadata(true);

        let strict = SchemaSyncWriter::new(
            Arc::new(catalog.clone()),
            WriterConfig {
                create_on_unknown: false,
                ..WriterConfig::default()
            },
        );
        let err = strict
            .write("APP.ORDERS", &[order_record("1", "1")])
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Metadata { .. }));

        // Default: attempt the create, which the existing table absorbs
        let report = writer(&catalog)
            .write("APP.ORDERS", &[order_record("1", "1")])
            .await
            .unwrap();
        assert!(!report.created);
        assert!(report.committed);
        assert_eq!(catalog.rows(&orders()).len(), 1);
    }

    #[tokio::test]
    async fn test_connection_failure_is_error() {
        let catalog = MemoryCatalog::new();
        catalog.fail_connect(true);
        let writer = writer(&catalog);
        assert!(writer.write("APP.ORDERS", &[]).await.is_err());
        assert!(!writer.write_compat("APP.ORDERS", &[]).await);
    }

    #[tokio::test]
    async fn test_struct_records_and_typed_mode() {
        let catalog = MemoryCatalog::new();
        let writer = SchemaSyncWriter::new(
            Arc::new(catalog.clone()),
            WriterConfig {
                type_mode: TypeMode::Typed,
                ..WriterConfig::default()
            },
        );
        let schema = RecordSchema::strings(["ID"]).with_field("PAID", FieldType::Boolean);
        let record = SinkRecord::from_struct(
            StructValue::new(schema).with("ID", "7").with("PAID", true),
        );
        let report = writer.write("APP.ORDERS", &[record]).await.unwrap();
        assert!(report.is_success());

        let rows = catalog.rows(&orders());
        assert_eq!(rows[0].get("PAID"), Some(&SqlValue::Bool(true)));
        assert!(catalog
            .sql_log()
            .iter()
            .any(|sql| sql == r#"ALTER TABLE "APP"."ORDERS" ADD "PAID" boolean"#));
    }

    #[tokio::test]
    async fn test_cache_is_used_and_invalidated() {
        let catalog = MemoryCatalog::new();
        let writer = SchemaSyncWriter::new(
            Arc::new(catalog.clone()),
            WriterConfig {
                metadata_cache_ttl_secs: Some(300),
                ..WriterConfig::default()
            },
        );
        writer.write("APP.ORDERS", &[order_record("1", "1")]).await.unwrap();
        writer.write("APP.ORDERS", &[order_record("2", "2")]).await.unwrap();
        assert_eq!(catalog.alteration_count(), 2);

        writer.invalidate_cache();
        writer.write("APP.ORDERS", &[order_record("3", "3")]).await.unwrap();
        assert_eq!(catalog.alteration_count(), 2);
        assert_eq!(catalog.rows(&orders()).len(), 3);
    }

    #[tokio::test]
    async fn test_probe_and_exists() {
        let catalog = MemoryCatalog::new().with_table(&orders(), &["ID"]);
        let writer = writer(&catalog);
        assert_eq!(writer.probe("APP.ORDERS").await.unwrap(), TableExistence::Present);
        assert!(writer.exists("APP.ORDERS").await);
        assert!(!writer.exists("APP.MISSING").await);
        assert!(!writer.exists("ORDERS").await);
        assert!(writer.probe("ORDERS").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_batch_still_ensures_table() {
        let catalog = MemoryCatalog::new();
        let report = writer(&catalog).write("APP.ORDERS", &[]).await.unwrap();

        assert!(report.created);
        assert!(report.committed);
        assert!(report.records.is_empty());
        assert!(report.is_success());
        assert!(catalog.table_exists(&orders()));
        assert!(catalog.rows(&orders()).is_empty());
    }

    #[tokio::test]
    async fn test_execution_failure_rolls_back_whole_batch() {
        let catalog = MemoryCatalog::new();
        catalog.fail_execution(true);
        let records = vec![order_record("1", "1"), order_record("2", "2")];
        let report = writer(&catalog).write("APP.ORDERS", &records).await.unwrap();

        assert!(!report.committed);
        assert!(report.error.as_deref().unwrap().contains("injected execution failure"));
        assert_eq!(report.failed_count(), 2);
        assert!(report.records.iter().all(|r| matches!(
            r.status,
            RecordStatus::Failed {
                stage: FailureStage::Execution,
                ..
            }
        )));
        assert_eq!(report.columns_added, vec!["ID", "AMOUNT"]);
        assert!(catalog.rows(&orders()).is_empty());
    }

    #[tokio::test]
    async fn test_fields_sharing_a_column_fail_only_that_record() {
        let catalog = MemoryCatalog::new();
        let records = vec![
            order_record("1", "1"),
            SinkRecord::new(RecordSchema::strings(["id", "ID"]), json!({"id": "a", "ID": "b"})),
            order_record("3", "3"),
        ];
        let report = writer(&catalog).write("APP.ORDERS", &records).await.unwrap();

        assert!(report.committed);
        assert_eq!(report.inserted_count(), 2);
        assert!(matches!(
            report.records[1].status,
            RecordStatus::Failed {
                stage: FailureStage::Extraction,
                ..
            }
        ));
        assert_eq!(catalog.rows(&orders()).len(), 2);
    }

    #[tokio::test]
    async fn test_over_long_names() {
        let catalog = MemoryCatalog::new();
        let writer = writer(&catalog);

        let long_table = format!("APP.{}", "T".repeat(64));
        let err = writer.write(&long_table, &[]).await.unwrap_err();
        assert!(err.is_config());
        assert_eq!(catalog.connection_count(), 0);

        let long = "F".repeat(64);
        let mut value = json!({"ID": "2"});
        value[long.as_str()] = json!("x");
        let wide = SinkRecord::new(RecordSchema::strings(["ID", long.as_str()]), value);
        let records = vec![order_record("1", "1"), wide];
        for _ in 0..2 {
            let report = writer.write("APP.ORDERS", &records).await.unwrap();
            assert!(report.committed);
            assert_eq!(report.inserted_count(), 1);
            assert_eq!(report.failed_count(), 1);
        }
        // ID and AMOUNT only, never the over-long column
        assert_eq!(catalog.alteration_count(), 2);
    }

    /// Provider that hands out at most `slots` connections at once and
    /// waits for a free slot otherwise, like a bounded pool.
    struct BoundedProvider {
        inner: MemoryCatalog,
        slots: Arc<Semaphore>,
    }

    struct BoundedConnection {
        inner: Box<dyn Connection>,
        _permit: OwnedSemaphorePermit,
    }

    #[async_trait]
    impl ConnectionProvider for BoundedProvider {
        async fn connect(&self) -> Result<Box<dyn Connection>> {
            let permit = self
                .slots
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SinkError::pool(e, "acquiring connection slot"))?;
            let inner = self.inner.connect().await?;
            Ok(Box::new(BoundedConnection {
                inner,
                _permit: permit,
            }))
        }

        fn db_type(&self) -> &str {
            "bounded"
        }

        fn dialect(&self) -> &dyn Dialect {
            self.inner.dialect()
        }
    }

    #[async_trait]
    impl Connection for BoundedConnection {
        async fn begin(&mut self) -> Result<()> {
            self.inner.begin().await
        }

        async fn commit(&mut self) -> Result<()> {
            self.inner.commit().await
        }

        async fn rollback(&mut self) -> Result<()> {
            self.inner.rollback().await
        }

        async fn execute(&mut self, statement: &Statement) -> Result<u64> {
            self.inner.execute(statement).await
        }

        async fn execute_batch(&mut self, statements: &[Statement]) -> Result<u64> {
            self.inner.execute_batch(statements).await
        }

        async fn table_exists(&mut self, table: &TableId) -> Result<bool> {
            self.inner.table_exists(table).await
        }

        async fn column_exists(&mut self, table: &TableId, column: &str) -> Result<bool> {
            self.inner.column_exists(table, column).await
        }

        async fn columns(&mut self, table: &TableId) -> Result<Vec<ColumnDescriptor>> {
            self.inner.columns(table).await
        }
    }

    #[tokio::test]
    async fn test_write_fits_in_single_connection_pool() {
        let catalog = MemoryCatalog::new();
        let provider = BoundedProvider {
            inner: catalog.clone(),
            slots: Arc::new(Semaphore::new(1)),
        };
        let writer = SchemaSyncWriter::new(Arc::new(provider), WriterConfig::default());

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            writer.write("APP.ORDERS", &[order_record("1", "1")]),
        )
        .await
        .expect("write waited on its own connection")
        .unwrap();
        assert!(report.is_success());
        assert_eq!(catalog.rows(&orders()).len(), 1);
    }
}
