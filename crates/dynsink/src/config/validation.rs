//! Configuration validation.

use super::Config;
use crate::core::validate_identifier;
use crate::drivers::common::SslMode;
use crate::drivers::TargetKind;
use crate::error::{Result, SinkError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    match TargetKind::from_type_name(&config.target.r#type) {
        Some(TargetKind::Postgres) => {
            if config.target.host.is_empty() {
                return Err(SinkError::Config("target.host is required".into()));
            }
            if config.target.database.is_empty() {
                return Err(SinkError::Config("target.database is required".into()));
            }
            if config.target.user.is_empty() {
                return Err(SinkError::Config("target.user is required".into()));
            }
            SslMode::parse(&config.target.ssl_mode)?;
        }
        Some(TargetKind::Memory) => {}
        None => {
            return Err(SinkError::Config(format!(
                "target.type must be 'postgres' or 'memory', got '{}'",
                config.target.r#type
            )));
        }
    }

    if config.target.max_connections == 0 {
        return Err(SinkError::Config(
            "target.max_connections must be at least 1".into(),
        ));
    }

    validate_identifier(&config.writer.identity_column).map_err(|e| {
        SinkError::Config(format!("writer.identity_column is invalid: {}", e))
    })?;

    if config.writer.varchar_length == 0 {
        return Err(SinkError::Config(
            "writer.varchar_length must be at least 1".into(),
        ));
    }

    if let Some(0) = config.writer.metadata_cache_ttl_secs {
        return Err(SinkError::Config(
            "writer.metadata_cache_ttl_secs must be at least 1 (omit it to disable caching)"
                .into(),
        ));
    }

    Ok(())
}
