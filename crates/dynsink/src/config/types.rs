//! Configuration type definitions.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::binding::{TypeMode, DEFAULT_VARCHAR_LENGTH};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database configuration.
    pub target: TargetConfig,

    /// Writer behavior configuration.
    #[serde(default)]
    pub writer: WriterConfig,
}

/// Target database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type: "postgres" or "memory".
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password. Never serialized.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Writer behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Name of the synthetic identity primary key (default: "ROW_ID").
    #[serde(default = "default_identity_column")]
    pub identity_column: String,

    /// Column typing policy (default: compat).
    #[serde(default)]
    pub type_mode: TypeMode,

    /// Length of VARCHAR columns in compat mode (default: 255).
    #[serde(default = "default_varchar_length")]
    pub varchar_length: u32,

    /// Create the table when its existence could not be confirmed either
    /// way (default: true).
    #[serde(default = "default_true")]
    pub create_on_unknown: bool,

    /// Cache column metadata for this many seconds. Unset means every write
    /// re-reads the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_cache_ttl_secs: Option<u64>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            identity_column: default_identity_column(),
            type_mode: TypeMode::default(),
            varchar_length: default_varchar_length(),
            create_on_unknown: true,
            metadata_cache_ttl_secs: None,
        }
    }
}

impl WriterConfig {
    /// Cache TTL as a duration, if caching is enabled.
    pub fn metadata_cache_ttl(&self) -> Option<Duration> {
        self.metadata_cache_ttl_secs.map(Duration::from_secs)
    }
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_require() -> String {
    "require".to_string()
}

fn default_max_connections() -> usize {
    4
}

fn default_identity_column() -> String {
    "ROW_ID".to_string()
}

fn default_varchar_length() -> u32 {
    DEFAULT_VARCHAR_LENGTH
}

fn default_true() -> bool {
    true
}
