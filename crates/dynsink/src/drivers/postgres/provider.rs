//! PostgreSQL connection provider.
//!
//! Uses deadpool-postgres for connection pooling. Pooled connections are
//! recycled with a `ROLLBACK` so a transaction abandoned on an error path
//! never leaks into the next borrower.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::{ColumnDescriptor, Connection, ConnectionProvider, Dialect, Statement, TableId};
use crate::drivers::common::SslMode;
use crate::error::{Result, SinkError};

use super::dialect::PostgresDialect;

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Pooled PostgreSQL connection provider.
pub struct PostgresProvider {
    pool: Pool,
    dialect: PostgresDialect,
}

impl PostgresProvider {
    /// Create a provider from configuration and verify connectivity.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        // Connection options for reliability
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(CONNECT_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Custom("ROLLBACK".to_string()),
        };

        let pool = match SslMode::parse(&config.ssl_mode)?.connector()? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections)
                    .runtime(Runtime::Tokio1)
                    .wait_timeout(Some(CONNECT_TIMEOUT))
                    .build()
                    .map_err(|e| SinkError::pool(e, "creating PostgreSQL pool"))?
            }
            Some(tls) => {
                let mgr = Manager::from_config(pg_config, tls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections)
                    .runtime(Runtime::Tokio1)
                    .wait_timeout(Some(CONNECT_TIMEOUT))
                    .build()
                    .map_err(|e| SinkError::pool(e, "creating PostgreSQL pool"))?
            }
        };

        let provider = Self {
            pool,
            dialect: PostgresDialect::new(),
        };
        provider.test_connection().await?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(provider)
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Test the database connection.
    pub async fn test_connection(&self) -> Result<()> {
        let client = self.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn get(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| SinkError::pool(e, "getting PostgreSQL connection"))
    }
}

#[async_trait]
impl ConnectionProvider for PostgresProvider {
    async fn connect(&self) -> Result<Box<dyn Connection>> {
        let client = self.get().await?;
        Ok(Box::new(PostgresConnection {
            client,
            dialect: self.dialect.clone(),
        }))
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }
}

/// One pooled connection. Returned to the pool on drop.
pub struct PostgresConnection {
    client: Object,
    dialect: PostgresDialect,
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn begin(&mut self) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        let sql = self.dialect.render(statement)?;
        debug!("Executing: {}", sql);
        self.client
            .execute(sql.as_str(), &[])
            .await
            .map_err(|e| classify_error(e, statement))
    }

    async fn execute_batch(&mut self, statements: &[Statement]) -> Result<u64> {
        if statements.is_empty() {
            return Ok(0);
        }

        let mut rendered = Vec::with_capacity(statements.len());
        for statement in statements {
            rendered.push(self.dialect.render(statement)?);
        }
        debug!("Executing batch of {} statements", rendered.len());

        // One round trip through the simple query protocol
        let sql = rendered.join(";\n");
        self.client
            .batch_execute(sql.as_str())
            .await
            .map_err(|e| classify_error(e, &statements[0]))?;
        Ok(statements.len() as u64)
    }

    async fn table_exists(&mut self, table: &TableId) -> Result<bool> {
        let sql = r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )
        "#;
        let row = self
            .client
            .query_one(sql, &[&table.namespace(), &table.table()])
            .await?;
        Ok(row.get::<_, bool>(0))
    }

    async fn column_exists(&mut self, table: &TableId, column: &str) -> Result<bool> {
        let sql = r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2 AND column_name = $3
            )
        "#;
        let row = self
            .client
            .query_one(sql, &[&table.namespace(), &table.table(), &column])
            .await?;
        Ok(row.get::<_, bool>(0))
    }

    async fn columns(&mut self, table: &TableId) -> Result<Vec<ColumnDescriptor>> {
        let sql = r#"
            SELECT column_name, data_type
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;
        let rows = self
            .client
            .query(sql, &[&table.namespace(), &table.table()])
            .await?;
        Ok(rows
            .iter()
            .map(|row| ColumnDescriptor {
                name: row.get(0),
                type_name: row.get(1),
            })
            .collect())
    }
}

/// Map duplicate-object races to their dedicated error variants.
fn classify_error(err: tokio_postgres::Error, statement: &Statement) -> SinkError {
    match (err.code(), statement) {
        (Some(code), Statement::CreateTable { table, .. }) if *code == SqlState::DUPLICATE_TABLE => {
            SinkError::TableAlreadyExists(table.to_string())
        }
        (Some(code), Statement::AddColumn { table, column, .. })
            if *code == SqlState::DUPLICATE_COLUMN =>
        {
            SinkError::ColumnAlreadyExists {
                table: table.to_string(),
                column: column.clone(),
            }
        }
        _ => SinkError::Database(err),
    }
}
