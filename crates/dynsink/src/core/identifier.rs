//! Table identifiers, identifier validation and quoting.
//!
//! Table names arrive as `NAMESPACE.TABLE` strings from connector
//! configuration. They are parsed once into a [`TableId`] at the boundary so
//! that malformed names are rejected as configuration errors before any
//! connection is opened, instead of failing deep inside a metadata query.
//!
//! # Security
//!
//! Identifiers cannot be bound as statement parameters, so every identifier
//! that ends up in generated SQL is validated here and quoted by the dialect.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SinkError};

use super::traits::Dialect;

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - SQL Server: 128 characters
/// - DB2: 128 bytes
pub const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SinkError::invalid_identifier(
            name,
            "identifier cannot be empty",
        ));
    }

    if name.contains('\0') {
        return Err(SinkError::invalid_identifier(
            name,
            "SECURITY: identifier contains null byte (possible injection attempt)",
        ));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(SinkError::invalid_identifier(
            name,
            format!(
                "SECURITY: identifier exceeds maximum length of {} bytes (got {} bytes)",
                MAX_IDENTIFIER_LENGTH,
                name.len()
            ),
        ));
    }

    Ok(())
}

/// Canonical column name for a record field: trimmed and uppercased.
pub fn normalize_column(field_name: &str) -> String {
    field_name.trim().to_uppercase()
}

/// A qualified `namespace.table` identifier.
///
/// Always holds exactly two non-empty, validated segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableId {
    namespace: String,
    table: String,
}

impl TableId {
    /// Build from already separated parts.
    pub fn new(namespace: impl Into<String>, table: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let table = table.into();
        let qualified = format!("{}.{}", namespace, table);

        if namespace.is_empty() {
            return Err(SinkError::invalid_identifier(
                qualified,
                "missing namespace segment",
            ));
        }
        if table.is_empty() {
            return Err(SinkError::invalid_identifier(
                qualified,
                "missing table segment",
            ));
        }
        validate_identifier(&namespace)?;
        validate_identifier(&table)?;

        Ok(Self { namespace, table })
    }

    /// Check both segments against a dialect's identifier rules.
    pub fn check_for(&self, dialect: &dyn Dialect) -> Result<()> {
        dialect.check_identifier(&self.namespace)?;
        dialect.check_identifier(&self.table)
    }

    /// Parse `namespace.table`.
    ///
    /// Exactly one separator is accepted; `orders`, `.orders`, `app.` and
    /// `db.app.orders` are all configuration errors.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let mut parts = raw.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(table), None) => Self::new(namespace, table),
            (_, None, _) => Err(SinkError::invalid_identifier(
                raw,
                "expected NAMESPACE.TABLE, found no namespace separator",
            )),
            _ => Err(SinkError::invalid_identifier(
                raw,
                "expected exactly two segments (NAMESPACE.TABLE)",
            )),
        }
    }

    /// Schema / namespace segment.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Table segment.
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.table)
    }
}

impl FromStr for TableId {
    type Err = SinkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TableId {
    type Error = SinkError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TableId> for String {
    fn from(id: TableId) -> Self {
        id.to_string()
    }
}
