//! Configuration type definitions with auto-tuning based on system resources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use sysinfo::System;
use tracing::info;

/// Subdirectory of the working directory used when `dump_dir` is not set.
pub const DEFAULT_DUMP_DIR_NAME: &str = "backup_dir";

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();

        Self {
            cpu_cores: sys.cpus().len(),
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!("System resources: {} CPU cores", self.cpu_cores);
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database the schema and data are read from.
    pub source: EndpointConfig,

    /// Database that is emptied and then restored into.
    pub destination: EndpointConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// External tool locations.
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.migration = self.migration.with_auto_tuning(&resources);
        self
    }
}

/// PostgreSQL endpoint configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_disable")]
    pub ssl_mode: String,

    /// Connection timeout in seconds. Driver default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Parallel jobs forwarded to pg_dump/pg_restore. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,

    /// Dump directory. Defaults to `<cwd>/backup_dir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_dir: Option<PathBuf>,

    /// Schemas emptied on the destination before the schema restore.
    #[serde(default = "default_schemas")]
    pub schemas: Vec<String>,

    /// Drop sequences during cleanup (default: true).
    #[serde(default = "default_true")]
    pub drop_sequences: bool,

    /// Drop enum types during cleanup (default: true).
    #[serde(default = "default_true")]
    pub drop_enum_types: bool,

    /// Restore data with `--single-transaction` instead of `--jobs` (default: false).
    #[serde(default)]
    pub single_transaction: bool,

    /// Skip ownership metadata in dump and restore (default: true).
    #[serde(default = "default_true")]
    pub no_owner: bool,

    /// Skip ACL metadata in dump and restore (default: true).
    #[serde(default = "default_true")]
    pub no_acl: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            jobs: None,
            dump_dir: None,
            schemas: default_schemas(),
            drop_sequences: true,
            drop_enum_types: true,
            single_transaction: false,
            no_owner: true,
            no_acl: true,
        }
    }
}

impl MigrationConfig {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that are None (not explicitly set).
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        // Jobs: half the cores, 1-8 range
        if self.jobs.is_none() {
            let jobs = (resources.cpu_cores / 2).clamp(1, 8);
            self.jobs = Some(jobs);
            info!("Auto-tuned config: jobs={}", jobs);
        }

        self
    }

    /// Effective job count, falling back to 4 before auto-tuning.
    pub fn get_jobs(&self) -> usize {
        self.jobs.unwrap_or(4)
    }

    /// Effective dump directory, resolved against the working directory.
    pub fn get_dump_dir(&self) -> std::io::Result<PathBuf> {
        let cwd = std::env::current_dir()?;
        Ok(match &self.dump_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => cwd.join(dir),
            None => cwd.join(DEFAULT_DUMP_DIR_NAME),
        })
    }
}

/// Locations of the external PostgreSQL client tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// pg_dump binary (default: resolved through PATH).
    #[serde(default = "default_pg_dump")]
    pub pg_dump: PathBuf,

    /// pg_restore binary (default: resolved through PATH).
    #[serde(default = "default_pg_restore")]
    pub pg_restore: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            pg_dump: default_pg_dump(),
            pg_restore: default_pg_restore(),
        }
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_schemas() -> Vec<String> {
    vec!["public".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_pg_dump() -> PathBuf {
    PathBuf::from("pg_dump")
}

fn default_pg_restore() -> PathBuf {
    PathBuf::from("pg_restore")
}
