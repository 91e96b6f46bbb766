//! Schema reconciliation.
//!
//! Compares a record's declared fields against the table's columns and adds
//! whatever is missing. Each field is processed in declaration order and
//! always ends up in the returned field list, even when its column could not
//! be verified or added; the insert for that record then fails on its own.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::binding::Binder;
use crate::core::{
    normalize_column, Connection, Dialect, FieldType, RecordSchema, Statement, TableId,
};
use crate::error::SinkError;

use super::cache::ColumnCache;

/// One record field mapped onto its column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledField {
    /// Field name as declared by the record schema.
    pub field: String,
    /// Canonical column name.
    pub column: String,
    pub field_type: FieldType,
}

/// Ordered field-to-column mapping for one record schema.
///
/// The insert's column list and value list are both derived from this, so
/// they line up by position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciledFields(Vec<ReconciledField>);

impl ReconciledFields {
    pub fn iter(&self) -> std::slice::Iter<'_, ReconciledField> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Source field names, in order.
    pub fn field_names(&self) -> Vec<&str> {
        self.0.iter().map(|f| f.field.as_str()).collect()
    }

    /// Column names, in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.0.iter().map(|f| f.column.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a ReconciledFields {
    type Item = &'a ReconciledField;
    type IntoIter = std::slice::Iter<'a, ReconciledField>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Which step of reconciliation failed for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The column lookup failed.
    Introspection,
    /// `ALTER TABLE ... ADD` failed.
    Alteration,
    /// The column name is not valid for the target dialect.
    InvalidName,
}

/// A recorded, non-fatal schema problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaIssue {
    pub column: String,
    pub kind: IssueKind,
    pub message: String,
}

/// Result of reconciling one record schema.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub fields: ReconciledFields,
    /// Columns this call added, in order.
    pub added: Vec<String>,
    pub issues: Vec<SchemaIssue>,
}

/// Issues the additive schema changes for a table.
pub struct Reconciler<'a> {
    dialect: &'a dyn Dialect,
    binder: Binder,
    cache: Option<&'a ColumnCache>,
}

impl<'a> Reconciler<'a> {
    pub fn new(dialect: &'a dyn Dialect, binder: Binder, cache: Option<&'a ColumnCache>) -> Self {
        Self {
            dialect,
            binder,
            cache,
        }
    }

    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    /// Make sure every field of `schema` has a column in `table`.
    ///
    /// `conn` must be in auto-commit mode; each `ADD` is committed on its own.
    pub async fn reconcile(
        &self,
        conn: &mut dyn Connection,
        table: &TableId,
        schema: &RecordSchema,
    ) -> Reconciliation {
        let mut result = Reconciliation::default();
        let mut known = self.known_columns(conn, table).await;

        for field in schema.fields() {
            let column = normalize_column(&field.name);
            result.fields.0.push(ReconciledField {
                field: field.name.clone(),
                column: column.clone(),
                field_type: field.field_type,
            });

            if let Err(e) = self.dialect.check_identifier(&column) {
                warn!("Not adding column {} to {}: {}", column, table, e);
                result.issues.push(SchemaIssue {
                    column,
                    kind: IssueKind::InvalidName,
                    message: e.to_string(),
                });
                continue;
            }

            let present = match known.as_ref() {
                Some(columns) => Ok(columns.contains(&column)),
                None => conn.column_exists(table, &column).await,
            };

            match present {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!("Column lookup for {}.{} failed: {}", table, column, e);
                    result.issues.push(SchemaIssue {
                        column,
                        kind: IssueKind::Introspection,
                        message: e.to_string(),
                    });
                    continue;
                }
            }

            match self.add_column(conn, table, &column, field.field_type).await {
                Ok(added) => {
                    if added {
                        result.added.push(column.clone());
                    }
                    if let Some(cache) = self.cache {
                        cache.add_column(table, &column);
                    }
                    if let Some(columns) = known.as_mut() {
                        columns.insert(column);
                    }
                }
                Err(e) => {
                    warn!("{}", e);
                    if let Some(cache) = self.cache {
                        cache.invalidate(table);
                    }
                    result.issues.push(SchemaIssue {
                        column,
                        kind: IssueKind::Alteration,
                        message: e.to_string(),
                    });
                }
            }
        }

        result
    }

    /// Column set to check against, when a single lookup is worth it.
    ///
    /// Without a cache every field is checked individually.
    async fn known_columns(
        &self,
        conn: &mut dyn Connection,
        table: &TableId,
    ) -> Option<HashSet<String>> {
        let cache = self.cache?;
        if let Some(columns) = cache.get(table) {
            return Some(columns);
        }

        match conn.columns(table).await {
            Ok(descriptors) => {
                let columns: HashSet<String> = descriptors.into_iter().map(|c| c.name).collect();
                cache.store(table, columns.clone());
                Some(columns)
            }
            Err(e) => {
                debug!("Column listing for {} failed, checking per field: {}", table, e);
                None
            }
        }
    }

    /// Returns `false` when another writer added the column first.
    async fn add_column(
        &self,
        conn: &mut dyn Connection,
        table: &TableId,
        column: &str,
        field_type: FieldType,
    ) -> Result<bool, SinkError> {
        let statement = Statement::AddColumn {
            table: table.clone(),
            column: column.to_string(),
            sql_type: self.binder.column_type(self.dialect, field_type),
        };

        match conn.execute(&statement).await {
            Ok(_) => {
                info!("Added column {} to {}", column, table);
                Ok(true)
            }
            Err(SinkError::ColumnAlreadyExists { .. }) => {
                debug!("Column {}.{} was added concurrently", table, column);
                Ok(false)
            }
            Err(e) => Err(SinkError::SchemaEvolution {
                table: table.to_string(),
                column: column.to_string(),
                message: e.to_string(),
            }),
        }
    }
}
