//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::admin::SslMode;
use crate::error::Result;
use std::path::Path;
use tracing::debug;

/// Environment variable overriding `source.password`.
pub const SOURCE_PASSWORD_ENV: &str = "PGDM_SOURCE_PASSWORD";
/// Environment variable overriding `destination.password`.
pub const DESTINATION_PASSWORD_ENV: &str = "PGDM_DESTINATION_PASSWORD";

impl Config {
    /// Load configuration from a YAML file, applying environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Load configuration from a YAML file exactly as written.
    ///
    /// Passwords from `PGDM_*_PASSWORD` are not applied, so the result is
    /// safe to write back to disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    fn load_with<P, F>(path: P, lookup: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(lookup);
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace passwords with values from the environment when present.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(password) = lookup(SOURCE_PASSWORD_ENV) {
            debug!("Using source password from {}", SOURCE_PASSWORD_ENV);
            self.source.password = password;
        }
        if let Some(password) = lookup(DESTINATION_PASSWORD_ENV) {
            debug!("Using destination password from {}", DESTINATION_PASSWORD_ENV);
            self.destination.password = password;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl EndpointConfig {
    /// Build a libpq keyword/value connection string for pg_dump/pg_restore.
    ///
    /// The password is left out; tools receive it through `PGPASSWORD`.
    pub fn connection_string(&self) -> String {
        let mut parts = vec![
            format!("host={}", quote_conninfo_value(&self.host)),
            format!("port={}", self.port),
            format!("dbname={}", quote_conninfo_value(&self.database)),
            format!("user={}", quote_conninfo_value(&self.user)),
            format!("sslmode={}", quote_conninfo_value(self.libpq_ssl_mode())),
        ];
        if let Some(secs) = self.connect_timeout_secs {
            parts.push(format!("connect_timeout={}", secs));
        }
        parts.join(" ")
    }

    /// Canonical `sslmode` for libpq, which compares it case-sensitively.
    ///
    /// Validation guarantees the value parses; anything else is passed through
    /// so libpq reports it.
    fn libpq_ssl_mode(&self) -> &str {
        match SslMode::parse(&self.ssl_mode) {
            Ok(mode) => mode.as_str(),
            Err(_) => &self.ssl_mode,
        }
    }

    /// Short description for logs: `user@host:port/database`.
    pub fn describe(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }

    /// Whether two endpoints point at the same database.
    pub fn same_database(&self, other: &EndpointConfig) -> bool {
        self.host == other.host && self.port == other.port && self.database == other.database
    }
}

/// Quote a libpq conninfo value when it is empty or contains spaces, quotes or backslashes.
fn quote_conninfo_value(value: &str) -> String {
    let needs_quotes =
        value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}
