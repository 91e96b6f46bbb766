//! Write results.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::SinkRecord;

use super::reconcile::SchemaIssue;

/// Stage at which a record was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// A field could not be read; the record was never queued.
    Extraction,
    /// The batch it was queued in did not commit.
    Execution,
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordStatus {
    Inserted,
    Failed { stage: FailureStage, reason: String },
}

/// Outcome of one record, with its source coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    /// Position in the input batch.
    pub index: usize,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    #[serde(flatten)]
    pub status: RecordStatus,
}

impl RecordOutcome {
    pub(crate) fn new(index: usize, record: &SinkRecord, status: RecordStatus) -> Self {
        Self {
            index,
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            status,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self.status, RecordStatus::Inserted)
    }
}

/// Summary of one `write` call.
#[derive(Debug, Clone, Serialize)]
pub struct WriteReport {
    pub table: String,
    /// The table did not exist and this call created it.
    pub created: bool,
    pub columns_added: Vec<String>,
    pub schema_issues: Vec<SchemaIssue>,
    /// One entry per input record, in input order.
    pub records: Vec<RecordOutcome>,
    /// The insert transaction committed.
    pub committed: bool,
    /// Execution or commit error, when `committed` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WriteReport {
    pub(crate) fn new(table: String, started_at: DateTime<Utc>) -> Self {
        Self {
            table,
            created: false,
            columns_added: Vec::new(),
            schema_issues: Vec::new(),
            records: Vec::new(),
            committed: false,
            error: None,
            started_at,
            finished_at: started_at,
        }
    }

    pub fn inserted_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_inserted()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.records.len() - self.inserted_count()
    }

    /// Committed with every record inserted.
    pub fn is_success(&self) -> bool {
        self.committed && self.failed_count() == 0
    }

    /// Records that were not inserted.
    pub fn failures(&self) -> impl Iterator<Item = &RecordOutcome> {
        self.records.iter().filter(|r| !r.is_inserted())
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Serialize the report to pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
