//! Table existence check.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::{Connection, ConnectionProvider, TableId};
use crate::error::Result;

/// What the catalog said about a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum TableExistence {
    Present,
    Absent,
    /// The catalog could not be queried. Carries the failure message.
    Unknown(String),
}

impl TableExistence {
    pub fn is_present(&self) -> bool {
        matches!(self, TableExistence::Present)
    }
}

impl fmt::Display for TableExistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableExistence::Present => write!(f, "present"),
            TableExistence::Absent => write!(f, "absent"),
            TableExistence::Unknown(reason) => write!(f, "unknown ({})", reason),
        }
    }
}

/// Look the table up in the catalog on a dedicated connection.
///
/// The lookup runs inside a transaction that is always rolled back. A
/// connection or metadata failure yields [`TableExistence::Unknown`].
pub async fn probe(provider: &dyn ConnectionProvider, table: &TableId) -> TableExistence {
    match lookup(provider, table).await {
        Ok(true) => TableExistence::Present,
        Ok(false) => TableExistence::Absent,
        Err(e) => {
            warn!("Could not determine whether {} exists: {}", table, e);
            TableExistence::Unknown(e.to_string())
        }
    }
}

/// Whether the table is confirmed present. Any failure reads as `false`.
pub async fn exists(provider: &dyn ConnectionProvider, table: &TableId) -> bool {
    probe(provider, table).await.is_present()
}

async fn lookup(provider: &dyn ConnectionProvider, table: &TableId) -> Result<bool> {
    let mut conn = provider.connect().await?;
    conn.begin().await?;
    let found = conn.table_exists(table).await;
    release(conn.as_mut()).await;
    let found = found?;
    debug!("Table {} exists: {}", table, found);
    Ok(found)
}

async fn release(conn: &mut dyn Connection) {
    if let Err(e) = conn.rollback().await {
        warn!("Rollback after existence check failed: {}", e);
    }
}
