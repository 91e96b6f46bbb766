//! Database driver implementations.
//!
//! Each driver implements [`ConnectionProvider`] and brings its own
//! [`Dialect`](crate::core::Dialect):
//!
//! - [`postgres`]: PostgreSQL through a deadpool connection pool
//! - [`memory`]: in-process catalog for dry runs and tests
//! - [`common`]: shared utilities (TLS)
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect`, `Connection` and `ConnectionProvider`
//! 3. Register the type name in [`TargetKind::from_type_name`] and [`connect`]

pub mod common;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

pub use common::SslMode;
pub use memory::MemoryCatalog;
pub use postgres::{PostgresDialect, PostgresProvider};

use crate::config::TargetConfig;
use crate::core::ConnectionProvider;
use crate::error::{Result, SinkError};

/// Target store families understood by [`connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Postgres,
    Memory,
}

impl TargetKind {
    /// Resolve a configured `target.type`, case-insensitively and with aliases.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(TargetKind::Postgres),
            "memory" => Some(TargetKind::Memory),
            _ => None,
        }
    }
}

/// Build a connection provider for the configured target type.
///
/// # Errors
///
/// Returns an error if the target type is not recognized or the target is
/// unreachable.
pub async fn connect(config: &TargetConfig) -> Result<Arc<dyn ConnectionProvider>> {
    match TargetKind::from_type_name(&config.r#type) {
        Some(TargetKind::Postgres) => Ok(Arc::new(PostgresProvider::new(config).await?)),
        Some(TargetKind::Memory) => Ok(Arc::new(MemoryCatalog::new())),
        None => Err(SinkError::Config(format!(
            "Unknown target type: '{}'. Supported types: postgres, memory",
            config.r#type
        ))),
    }
}
