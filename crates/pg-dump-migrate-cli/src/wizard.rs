//! Interactive configuration wizard for creating/editing config files.

use dialoguer::{Confirm, Input, Password, Select};
use pg_dump_migrate::{
    Config, EndpointConfig, MigrationConfig, Orchestrator, SslMode, ToolsConfig,
};
use std::path::Path;

/// Result type for wizard operations.
pub type WizardResult<T> = Result<T, WizardError>;

/// Errors that can occur during wizard execution.
#[derive(Debug)]
pub enum WizardError {
    /// User cancelled the wizard.
    Cancelled,
    /// IO error (file read/write).
    Io(std::io::Error),
    /// Config serialization error.
    Config(String),
    /// Validation error.
    Validation(String),
}

impl std::fmt::Display for WizardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "Configuration cancelled"),
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Config(msg) => write!(f, "Config error: {}", msg),
            Self::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for WizardError {}

impl From<std::io::Error> for WizardError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<dialoguer::Error> for WizardError {
    fn from(e: dialoguer::Error) -> Self {
        Self::Io(std::io::Error::other(e.to_string()))
    }
}

/// Run the configuration wizard.
pub async fn run_wizard(output: &Path, force: bool) -> WizardResult<()> {
    println!();
    println!("PostgreSQL dump/restore migration - Configuration Wizard");
    println!("=========================================================");
    println!();

    let existing = if output.exists() && !force {
        load_existing(output)?
    } else {
        None
    };

    let source = prompt_endpoint(
        "Source Database",
        existing.as_ref().map(|c| &c.source),
        5432,
    )?;
    let destination = prompt_endpoint(
        "Destination Database",
        existing.as_ref().map(|c| &c.destination),
        5432,
    )?;
    let migration = prompt_migration_config(existing.as_ref().map(|c| &c.migration))?;

    let config = Config {
        source,
        destination,
        migration,
        tools: existing.map(|c| c.tools).unwrap_or_else(ToolsConfig::default),
    };

    if let Err(e) = config.validate() {
        return Err(WizardError::Validation(e.to_string()));
    }

    print_summary(&config);

    if Confirm::new()
        .with_prompt("Test database connections?")
        .default(false)
        .interact()?
    {
        test_connections(&config).await;
    }

    if !Confirm::new()
        .with_prompt(format!("Save to {}?", output.display()))
        .default(true)
        .interact()?
    {
        return Err(WizardError::Cancelled);
    }

    write_config(&config, output)?;

    println!("\nConfiguration saved to {}", output.display());
    println!("Run 'pg-dump-migrate run --dry-run' to review the steps.");

    Ok(())
}

fn load_existing(path: &Path) -> WizardResult<Option<Config>> {
    println!("File already exists: {}\n", path.display());

    let options = &["Edit existing configuration", "Overwrite with new", "Abort"];
    let selection = Select::new()
        .with_prompt("What would you like to do?")
        .items(options)
        .default(0)
        .interact()?;

    match selection {
        0 => match Config::from_file(path) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                println!("Warning: Could not parse existing file: {}", e);
                println!("Starting with fresh configuration.\n");
                Ok(None)
            }
        },
        1 => Ok(None),
        _ => Err(WizardError::Cancelled),
    }
}

fn prompt_endpoint(
    title: &str,
    existing: Option<&EndpointConfig>,
    default_port: u16,
) -> WizardResult<EndpointConfig> {
    println!("{}", title);
    println!("{}", "-".repeat(title.len()));

    let host: String = Input::new()
        .with_prompt("  Host")
        .default(
            existing
                .map(|c| c.host.clone())
                .unwrap_or_else(|| "localhost".to_string()),
        )
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("  Port")
        .default(existing.map(|c| c.port).unwrap_or(default_port))
        .interact_text()?;

    let database: String = Input::new()
        .with_prompt("  Database")
        .default(existing.map(|c| c.database.clone()).unwrap_or_default())
        .interact_text()?;

    let user: String = Input::new()
        .with_prompt("  User")
        .default(existing.map(|c| c.user.clone()).unwrap_or_default())
        .interact_text()?;

    let password = if existing.is_some() {
        let input: String = Password::new()
            .with_prompt("  Password (blank to keep existing)")
            .allow_empty_password(true)
            .interact()?;
        if input.is_empty() {
            existing.map(|e| e.password.clone()).unwrap_or_default()
        } else {
            input
        }
    } else {
        Password::new()
            .with_prompt("  Password")
            .allow_empty_password(true)
            .interact()?
    };

    let ssl_modes = &["disable", "require", "verify-ca", "verify-full"];
    let default_idx = existing
        .and_then(|c| SslMode::parse(&c.ssl_mode).ok())
        .and_then(|mode| ssl_modes.iter().position(|&m| m == mode.as_str()))
        .unwrap_or(0);
    let ssl_mode_idx = Select::new()
        .with_prompt("  SSL Mode")
        .items(ssl_modes)
        .default(default_idx)
        .interact()?;

    println!();

    Ok(EndpointConfig {
        host,
        port,
        database,
        user,
        password,
        ssl_mode: ssl_modes[ssl_mode_idx].to_string(),
        connect_timeout_secs: existing.and_then(|c| c.connect_timeout_secs),
    })
}

fn prompt_migration_config(existing: Option<&MigrationConfig>) -> WizardResult<MigrationConfig> {
    println!("Migration Settings");
    println!("------------------");

    let mut config = existing.cloned().unwrap_or_default();

    let jobs: String = Input::new()
        .with_prompt("  Parallel jobs")
        .default(
            config
                .jobs
                .map(|v| v.to_string())
                .unwrap_or_else(|| "auto".to_string()),
        )
        .interact_text()?;
    config.jobs = match jobs.trim() {
        "" | "auto" | "AUTO" => None,
        value => match value.parse::<usize>() {
            Ok(v) => Some(v),
            Err(_) => {
                println!("    Invalid number, using auto-tuned value");
                None
            }
        },
    };

    let schemas: String = Input::new()
        .with_prompt("  Destination schemas to clean (comma-separated)")
        .default(config.schemas.join(", "))
        .interact_text()?;
    config.schemas = schemas
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    config.drop_sequences = Confirm::new()
        .with_prompt("  Drop sequences during cleanup")
        .default(config.drop_sequences)
        .interact()?;

    config.drop_enum_types = Confirm::new()
        .with_prompt("  Drop enum types during cleanup")
        .default(config.drop_enum_types)
        .interact()?;

    config.single_transaction = Confirm::new()
        .with_prompt("  Restore data in a single transaction (no parallel restore)")
        .default(config.single_transaction)
        .interact()?;

    println!();

    Ok(config)
}

fn print_summary(config: &Config) {
    println!("Configuration Summary");
    println!("---------------------");
    println!("  Source: {}", config.source.describe());
    println!("  Destination: {}", config.destination.describe());
    println!(
        "  Jobs: {}",
        config
            .migration
            .jobs
            .map(|j| j.to_string())
            .unwrap_or_else(|| "auto".to_string())
    );
    println!("  Clean schemas: {}", config.migration.schemas.join(", "));
    if config.migration.single_transaction {
        println!("  Data restore: single transaction");
    }
    println!();
}

async fn test_connections(config: &Config) {
    println!("\nTesting connections...");

    let orchestrator = match Orchestrator::new(config.clone()) {
        Ok(orch) => orch,
        Err(e) => {
            println!("  Failed to initialize: {}", e);
            return;
        }
    };

    let health = orchestrator.health_check().await;
    println!(
        "  Source: {} ({}ms)",
        if health.source_connected { "OK" } else { "FAILED" },
        health.source_latency_ms
    );
    if let Some(ref err) = health.source_error {
        println!("    Error: {}", err);
    }
    println!(
        "  Destination: {} ({}ms)",
        if health.destination_connected { "OK" } else { "FAILED" },
        health.destination_latency_ms
    );
    if let Some(ref err) = health.destination_error {
        println!("    Error: {}", err);
    }
    if !health.healthy {
        println!("\n  Warning: One or more connections failed.");
    }
    println!();
}

fn write_config(config: &Config, path: &Path) -> WizardResult<()> {
    let header = "# pg-dump-migrate configuration\n\
                  # Generated by pg-dump-migrate init\n\
                  # Passwords may be supplied via PGDM_SOURCE_PASSWORD / PGDM_DESTINATION_PASSWORD\n\n";

    let yaml = serde_yaml::to_string(config).map_err(|e| WizardError::Config(e.to_string()))?;

    std::fs::write(path, format!("{}{}", header, yaml))?;

    Ok(())
}
