//! Statements issued by the writer, kept as data until a dialect renders them.

use super::identifier::TableId;
use super::value::SqlValue;

/// One DDL or DML statement against the target table.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Create a table whose only column is an identity primary key.
    CreateTable {
        table: TableId,
        identity_column: String,
    },

    /// Add one nullable column.
    AddColumn {
        table: TableId,
        column: String,
        sql_type: String,
    },

    /// Insert one row. `columns[i]` receives `values[i]`.
    Insert {
        table: TableId,
        columns: Vec<String>,
        values: Vec<SqlValue>,
    },
}

impl Statement {
    /// Build an insert from `(column, value)` pairs so both lists come out
    /// of the same traversal.
    pub fn insert<I>(table: TableId, pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, SqlValue)>,
    {
        let (columns, values) = pairs.into_iter().unzip();
        Statement::Insert {
            table,
            columns,
            values,
        }
    }

    /// Target table of the statement.
    pub fn table(&self) -> &TableId {
        match self {
            Statement::CreateTable { table, .. }
            | Statement::AddColumn { table, .. }
            | Statement::Insert { table, .. } => table,
        }
    }

    /// Whether this is a schema change.
    pub fn is_ddl(&self) -> bool {
        !matches!(self, Statement::Insert { .. })
    }
}
