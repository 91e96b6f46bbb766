//! Core traits for the schema-reconciling writer.
//!
//! - [`ConnectionProvider`]: yields scoped connections to the target store
//! - [`Connection`]: transactional control, statement execution, catalog introspection
//! - [`Dialect`]: SQL syntax strategy used to render [`Statement`]s
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` keeps DDL/DML syntax out of the writer
//! - **Template Method**: `Dialect::render` and `Connection::execute_batch`
//!   have default implementations built on the smaller required methods

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SinkError};

use super::identifier::{validate_identifier, TableId, MAX_IDENTIFIER_LENGTH};
use super::record::FieldType;
use super::statement::Statement;
use super::value::SqlValue;

/// A column as reported by catalog introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name as stored in the catalog.
    pub name: String,
    /// Catalog type name (e.g. `character varying`).
    pub type_name: String,
}

/// A live connection to the target store.
///
/// Connections start in auto-commit mode: every statement is committed on
/// its own until [`Connection::begin`] opens an explicit transaction.
/// Dropping a connection releases it, including on error paths.
#[async_trait]
pub trait Connection: Send {
    // ===== Transaction control =====

    /// Disable auto-commit and open a transaction.
    async fn begin(&mut self) -> Result<()>;

    /// Commit the open transaction and return to auto-commit.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction and return to auto-commit.
    async fn rollback(&mut self) -> Result<()>;

    // ===== Execution =====

    /// Execute one statement. Returns the number of affected rows.
    async fn execute(&mut self, statement: &Statement) -> Result<u64>;

    /// Execute statements as one batch, in order.
    ///
    /// The default runs them one at a time; drivers override this to send
    /// the whole batch in a single round trip.
    async fn execute_batch(&mut self, statements: &[Statement]) -> Result<u64> {
        let mut affected = 0;
        for statement in statements {
            affected += self.execute(statement).await?;
        }
        Ok(affected)
    }

    // ===== Catalog introspection =====

    /// Whether a table with this namespace and name exists.
    async fn table_exists(&mut self, table: &TableId) -> Result<bool>;

    /// Whether the table has a column with exactly this name.
    async fn column_exists(&mut self, table: &TableId, column: &str) -> Result<bool>;

    /// All columns of the table, in ordinal order.
    async fn columns(&mut self, table: &TableId) -> Result<Vec<ColumnDescriptor>>;
}

/// Source of connections (typically a pool).
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Acquire a connection in auto-commit mode.
    async fn connect(&self) -> Result<Box<dyn Connection>>;

    /// Get the database type identifier (e.g., "postgres", "memory").
    fn db_type(&self) -> &str;

    /// SQL dialect spoken by the connections.
    fn dialect(&self) -> &dyn Dialect;
}

/// SQL syntax strategy for different database engines.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier.
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_ident(&self, name: &str) -> String;

    /// Longest identifier, in bytes, the engine stores without truncating.
    fn max_identifier_length(&self) -> usize {
        MAX_IDENTIFIER_LENGTH
    }

    /// Validate an identifier against the generic rules and this dialect's
    /// length limit.
    fn check_identifier(&self, name: &str) -> Result<()> {
        validate_identifier(name)?;
        let limit = self.max_identifier_length();
        if name.len() > limit {
            return Err(SinkError::invalid_identifier(
                name,
                format!(
                    "identifier exceeds the {} limit of {} bytes (got {} bytes)",
                    self.name(),
                    limit,
                    name.len()
                ),
            ));
        }
        Ok(())
    }

    /// Column definition of the synthetic identity key, after its name.
    fn identity_definition(&self) -> &str {
        "INTEGER GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"
    }

    /// Whether `CREATE TABLE IF NOT EXISTS` is understood.
    fn supports_create_if_not_exists(&self) -> bool {
        false
    }

    /// Variable-length string column type.
    fn varchar_type(&self, length: u32) -> String {
        format!("VARCHAR({})", length)
    }

    /// Native column type for a field type.
    fn column_type(&self, field_type: FieldType) -> String;

    /// Render a value as an SQL literal.
    fn encode_literal(&self, value: &SqlValue) -> String {
        match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(true) => "TRUE".to_string(),
            SqlValue::Bool(false) => "FALSE".to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F64(v) if v.is_finite() => v.to_string(),
            SqlValue::F64(v) => quote_literal(&v.to_string()),
            SqlValue::Text(s) => quote_literal(s),
        }
    }

    /// `schema.table` with proper quoting.
    fn qualify(&self, table: &TableId) -> String {
        format!(
            "{}.{}",
            self.quote_ident(table.namespace()),
            self.quote_ident(table.table())
        )
    }

    /// Render a statement to SQL text.
    ///
    /// Every identifier is validated first, so a statement carrying a
    /// malformed or over-long name fails here instead of reaching the store.
    fn render(&self, statement: &Statement) -> Result<String> {
        let table = statement.table();
        self.check_identifier(table.namespace())?;
        self.check_identifier(table.table())?;

        match statement {
            Statement::CreateTable {
                table,
                identity_column,
            } => {
                self.check_identifier(identity_column)?;
                let if_not_exists = if self.supports_create_if_not_exists() {
                    "IF NOT EXISTS "
                } else {
                    ""
                };
                Ok(format!(
                    "CREATE TABLE {}{} ({} {})",
                    if_not_exists,
                    self.qualify(table),
                    self.quote_ident(identity_column),
                    self.identity_definition()
                ))
            }
            Statement::AddColumn {
                table,
                column,
                sql_type,
            } => {
                self.check_identifier(column)?;
                Ok(format!(
                    "ALTER TABLE {} ADD {} {}",
                    self.qualify(table),
                    self.quote_ident(column),
                    sql_type
                ))
            }
            Statement::Insert {
                table,
                columns,
                values,
            } => {
                if columns.len() != values.len() {
                    return Err(SinkError::execution(
                        table.to_string(),
                        format!(
                            "insert has {} columns but {} values",
                            columns.len(),
                            values.len()
                        ),
                    ));
                }
                let mut seen = HashSet::with_capacity(columns.len());
                let mut quoted = Vec::with_capacity(columns.len());
                for column in columns {
                    self.check_identifier(column)?;
                    if !seen.insert(column.as_str()) {
                        return Err(SinkError::invalid_identifier(
                            column.as_str(),
                            "column specified more than once",
                        ));
                    }
                    quoted.push(self.quote_ident(column));
                }
                let literals: Vec<String> =
                    values.iter().map(|v| self.encode_literal(v)).collect();
                Ok(format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    self.qualify(table),
                    quoted.join(", "),
                    literals.join(", ")
                ))
            }
        }
    }
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
