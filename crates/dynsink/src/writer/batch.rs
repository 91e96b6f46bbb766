//! Batch insert building and execution.
//!
//! Every record is reconciled against its own schema, then its values are
//! read in the order the reconciler returned the fields. A record whose
//! extraction fails, or whose insert cannot be rendered (two fields mapping
//! to one column, an over-long column name), is dropped from the batch and
//! reported; the remaining inserts execute and commit as one transaction.

use tracing::{debug, info, warn};

use crate::binding::Binder;
use crate::core::{Connection, SinkRecord, Statement, TableId};
use crate::error::{Result, SinkError};
use crate::extract::get_value;

use super::reconcile::{ReconciledFields, Reconciler, SchemaIssue};
use super::report::{FailureStage, RecordOutcome, RecordStatus};

/// Inserts ready to execute, plus what was learned building them.
#[derive(Debug, Default)]
pub struct PreparedBatch {
    pub statements: Vec<Statement>,
    /// Input index of the record behind each statement.
    pub queued: Vec<usize>,
    /// Records dropped before execution.
    pub skipped: Vec<RecordOutcome>,
    pub columns_added: Vec<String>,
    pub schema_issues: Vec<SchemaIssue>,
}

impl PreparedBatch {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Builds and runs the batch for one table.
pub struct BatchInsertBuilder<'a> {
    table: &'a TableId,
    binder: Binder,
    reconciler: Reconciler<'a>,
}

impl<'a> BatchInsertBuilder<'a> {
    pub fn new(table: &'a TableId, binder: Binder, reconciler: Reconciler<'a>) -> Self {
        Self {
            table,
            binder,
            reconciler,
        }
    }

    /// Reconcile and extract every record.
    ///
    /// `schema_conn` carries the `ALTER TABLE` statements and must be in
    /// auto-commit mode.
    pub async fn prepare(
        &self,
        schema_conn: &mut dyn Connection,
        records: &[SinkRecord],
    ) -> PreparedBatch {
        let mut batch = PreparedBatch::default();

        for (index, record) in records.iter().enumerate() {
            let reconciliation = self
                .reconciler
                .reconcile(schema_conn, self.table, &record.value_schema)
                .await;
            batch.columns_added.extend(reconciliation.added);
            batch.schema_issues.extend(reconciliation.issues);

            match self.build_insert(&reconciliation.fields, record) {
                Ok(statement) => {
                    batch.statements.push(statement);
                    batch.queued.push(index);
                }
                Err(e) => {
                    warn!(
                        "Skipping record {} ({}/{}@{}): {}",
                        index, record.topic, record.partition, record.offset, e
                    );
                    batch.skipped.push(RecordOutcome::new(
                        index,
                        record,
                        RecordStatus::Failed {
                            stage: FailureStage::Extraction,
                            reason: match e {
                                SinkError::Extraction(inner) => inner.to_string(),
                                other => other.to_string(),
                            },
                        },
                    ));
                }
            }
        }

        batch
    }

    /// One insert for `record`, columns and values taken in `fields` order.
    ///
    /// The statement is rendered once here, so an insert the target would
    /// reject for its column list fails this record alone.
    pub fn build_insert(
        &self,
        fields: &ReconciledFields,
        record: &SinkRecord,
    ) -> Result<Statement> {
        let mut pairs = Vec::with_capacity(fields.len());
        for field in fields {
            let value = get_value(&record.value, &field.field)?;
            pairs.push((
                field.column.clone(),
                self.binder.bind(field.field_type, value),
            ));
        }
        let statement = Statement::insert(self.table.clone(), pairs);
        self.reconciler.dialect().render(&statement)?;
        Ok(statement)
    }

    /// Execute the batch in one transaction and commit it.
    ///
    /// On failure the transaction is rolled back and the error returned;
    /// none of the queued rows are kept.
    pub async fn execute(&self, conn: &mut dyn Connection, batch: &PreparedBatch) -> Result<u64> {
        conn.begin().await?;

        let result = match conn.execute_batch(&batch.statements).await {
            Ok(rows) => conn.commit().await.map(|_| rows),
            Err(e) => Err(e),
        };

        match result {
            Ok(rows) => {
                info!("Committed {} rows into {}", rows, self.table);
                Ok(rows)
            }
            Err(e) => {
                warn!("Batch into {} failed, rolling back: {}", self.table, e);
                if let Err(rollback_err) = conn.rollback().await {
                    debug!("Rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::TypeMode;
    use crate::core::{ConnectionProvider, FieldType, RecordSchema, SqlValue, StructValue};
    use crate::drivers::{MemoryCatalog, PostgresDialect};
    use serde_json::json;

    fn orders() -> TableId {
        TableId::parse("APP.ORDERS").unwrap()
    }

    #[tokio::test]
    async fn test_columns_and_values_align() {
        let catalog = MemoryCatalog::new().with_table(&orders(), &["ROW_ID"]);
        let dialect = PostgresDialect::new();
        let table = orders();
        let builder = BatchInsertBuilder::new(
            &table,
            Binder::default(),
            Reconciler::new(&dialect, Binder::default(), None),
        );
        let mut conn = catalog.connect().await.unwrap();

        // Map iteration order differs from declaration order
        let schema = RecordSchema::strings(["ZED", "ALPHA", "MID"]);
        let record = SinkRecord::new(schema, json!({"ALPHA": "a", "MID": "m", "ZED": "z"}));
        let batch = builder.prepare(conn.as_mut(), &[record]).await;

        match &batch.statements[0] {
            Statement::Insert {
                columns, values, ..
            } => {
                assert_eq!(columns, &vec!["ZED", "ALPHA", "MID"]);
                assert_eq!(
                    values,
                    &vec![SqlValue::from("z"), SqlValue::from("a"), SqlValue::from("m")]
                );
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_extraction_failure_skips_record_only() {
        let catalog = MemoryCatalog::new().with_table(&orders(), &["ROW_ID"]);
        let dialect = PostgresDialect::new();
        let table = orders();
        let builder = BatchInsertBuilder::new(
            &table,
            Binder::default(),
            Reconciler::new(&dialect, Binder::default(), None),
        );
        let mut conn = catalog.connect().await.unwrap();

        let schema = RecordSchema::strings(["ID", "AMOUNT"]);
        let records = vec![
            SinkRecord::new(schema.clone(), json!({"ID": "1", "AMOUNT": "1.00"})),
            SinkRecord::new(schema.clone(), json!({"ID": "2"})).at("orders", 3, 17),
            SinkRecord::from_struct(StructValue::new(schema).with("ID", "3")),
        ];
        let batch = builder.prepare(conn.as_mut(), &records).await;

        assert_eq!(batch.queued, vec![0]);
        assert_eq!(batch.skipped.len(), 2);
        assert_eq!(batch.skipped[0].index, 1);
        assert_eq!(batch.skipped[0].offset, 17);
        match &batch.skipped[1].status {
            RecordStatus::Failed { stage, reason } => {
                assert_eq!(*stage, FailureStage::Extraction);
                assert!(reason.contains("does not exist"));
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fields_sharing_a_column_fail_that_record() {
        let catalog = MemoryCatalog::new().with_table(&orders(), &["ROW_ID"]);
        let dialect = PostgresDialect::new();
        let table = orders();
        let builder = BatchInsertBuilder::new(
            &table,
            Binder::default(),
            Reconciler::new(&dialect, Binder::default(), None),
        );
        let mut conn = catalog.connect().await.unwrap();

        let records = vec![
            SinkRecord::new(RecordSchema::strings(["ID"]), json!({"ID": "1"})),
            SinkRecord::new(RecordSchema::strings(["id", "ID"]), json!({"id": "a", "ID": "b"})),
        ];
        let batch = builder.prepare(conn.as_mut(), &records).await;

        assert_eq!(batch.queued, vec![0]);
        assert_eq!(batch.skipped.len(), 1);
        match &batch.skipped[0].status {
            RecordStatus::Failed { stage, reason } => {
                assert_eq!(*stage, FailureStage::Extraction);
                assert!(reason.contains("more than once"));
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(catalog.alteration_count(), 1);
    }

    #[tokio::test]
    async fn test_typed_binding() {
        let dialect = PostgresDialect::new();
        let table = orders();
        let binder = Binder::new(TypeMode::Typed, 255);
        let builder =
            BatchInsertBuilder::new(&table, binder, Reconciler::new(&dialect, binder, None));

        let schema = RecordSchema::strings(["ID"]).with_field("QTY", FieldType::Int32);
        let record = SinkRecord::new(schema.clone(), json!({"ID": "1", "QTY": "7"}));
        let catalog = MemoryCatalog::new();
        let mut conn = catalog.connect().await.unwrap();
        catalog.fail_metadata(true);
        let fields = builder
            .reconciler
            .reconcile(conn.as_mut(), &table, &schema)
            .await
            .fields;

        let statement = builder.build_insert(&fields, &record).unwrap();
        match statement {
            Statement::Insert { values, .. } => {
                assert_eq!(values, vec![SqlValue::from("1"), SqlValue::I64(7)]);
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_rolls_back_on_failure() {
        let catalog = MemoryCatalog::new().with_table(&orders(), &["ROW_ID"]);
        let dialect = PostgresDialect::new();
        let table = orders();
        let builder = BatchInsertBuilder::new(
            &table,
            Binder::default(),
            Reconciler::new(&dialect, Binder::default(), None),
        );
        let mut conn = catalog.connect().await.unwrap();
        let schema = RecordSchema::strings(["ID"]);
        let records = vec![
            SinkRecord::new(schema.clone(), json!({"ID": "1"})),
            SinkRecord::new(schema, json!({"ID": "2"})),
        ];
        let batch = builder.prepare(conn.as_mut(), &records).await;

        catalog.fail_commit(true);
        assert!(builder.execute(conn.as_mut(), &batch).await.is_err());
        assert!(catalog.rows(&orders()).is_empty());

        catalog.fail_commit(false);
        assert_eq!(builder.execute(conn.as_mut(), &batch).await.unwrap(), 2);
        assert_eq!(catalog.rows(&orders()).len(), 2);
    }
}
