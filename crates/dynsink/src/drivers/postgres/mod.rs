//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresProvider`]: pooled connection provider
//! - [`PostgresConnection`]: one pooled connection

mod dialect;
mod provider;

pub use dialect::PostgresDialect;
pub use provider::{PostgresConnection, PostgresProvider};
