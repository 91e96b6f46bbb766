//! Table creation.

use tracing::{debug, info};

use crate::core::{ConnectionProvider, Statement, TableId};
use crate::error::{Result, SinkError};

/// Create `table` with a single identity primary key column.
///
/// Runs in auto-commit mode on its own connection, so the table survives a
/// later failed insert. Losing a creation race to another writer counts as
/// success and returns `false`.
pub async fn create(
    provider: &dyn ConnectionProvider,
    table: &TableId,
    identity_column: &str,
) -> Result<bool> {
    let statement = Statement::CreateTable {
        table: table.clone(),
        identity_column: identity_column.to_string(),
    };

    let mut conn = provider.connect().await?;
    match conn.execute(&statement).await {
        Ok(_) => {
            info!("Created table {} ({} identity key)", table, identity_column);
            Ok(true)
        }
        Err(SinkError::TableAlreadyExists(_)) => {
            debug!("Table {} was created concurrently", table);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
