//! # pg-dump-migrate
//!
//! One-shot PostgreSQL to PostgreSQL migration built on `pg_dump` and
//! `pg_restore` directory archives.
//!
//! A run is a fixed sequence of steps, aborted on the first failure:
//!
//! - **Connectivity check** against source and destination
//! - **Destination cleanup** (tables, sequences, enum types)
//! - **Schema transfer** through a fresh dump directory
//! - **Data transfer** with parallel jobs and triggers disabled
//!
//! ## Example
//!
//! ```rust,no_run
//! use pg_dump_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pg_dump_migrate::MigrateError> {
//!     let config = Config::load("config.yaml")?.with_auto_tuning();
//!     let orchestrator = Orchestrator::new(config)?;
//!     let result = orchestrator.run().await?;
//!     println!("Completed {} steps", result.steps.len());
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod config;
pub mod dump_dir;
pub mod error;
pub mod orchestrator;
pub mod tools;

// Re-exports for convenient access
pub use admin::{PgAdmin, SqlAdmin, SslMode};
pub use config::{Config, EndpointConfig, MigrationConfig, ToolsConfig};
pub use dump_dir::DumpDir;
pub use error::{MigrateError, Result};
pub use orchestrator::{
    HealthCheckResult, MigrationResult, Orchestrator, Phase, PlannedStep, StepReport,
};
pub use tools::{ProcessRunner, ToolInvocation, ToolRunner};
