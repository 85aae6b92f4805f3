//! Configuration validation.

use super::{Config, EndpointConfig};
use crate::admin::SslMode;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_endpoint("source", &config.source)?;
    validate_endpoint("destination", &config.destination)?;

    // Cannot migrate onto the database we are dumping
    if config.source.same_database(&config.destination) {
        return Err(MigrateError::Config(
            "source and destination cannot be the same database".into(),
        ));
    }

    if let Some(0) = config.migration.jobs {
        return Err(MigrateError::Config(
            "migration.jobs must be at least 1".into(),
        ));
    }

    if config.migration.schemas.is_empty() {
        return Err(MigrateError::Config(
            "migration.schemas must list at least one schema".into(),
        ));
    }
    if config.migration.schemas.iter().any(|s| s.trim().is_empty()) {
        return Err(MigrateError::Config(
            "migration.schemas cannot contain empty names".into(),
        ));
    }

    if config.tools.pg_dump.as_os_str().is_empty() {
        return Err(MigrateError::Config("tools.pg_dump cannot be empty".into()));
    }
    if config.tools.pg_restore.as_os_str().is_empty() {
        return Err(MigrateError::Config(
            "tools.pg_restore cannot be empty".into(),
        ));
    }

    Ok(())
}

fn validate_endpoint(name: &str, endpoint: &EndpointConfig) -> Result<()> {
    if endpoint.host.is_empty() {
        return Err(MigrateError::Config(format!("{}.host is required", name)));
    }
    if endpoint.database.is_empty() {
        return Err(MigrateError::Config(format!(
            "{}.database is required",
            name
        )));
    }
    if endpoint.user.is_empty() {
        return Err(MigrateError::Config(format!("{}.user is required", name)));
    }
    SslMode::parse(&endpoint.ssl_mode)
        .map_err(|e| MigrateError::Config(format!("{}: {}", name, e)))?;
    Ok(())
}
