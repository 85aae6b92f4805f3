//! pg-dump-migrate CLI - PostgreSQL migration via pg_dump/pg_restore.

mod wizard;

use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use pg_dump_migrate::{Config, MigrateError, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "pg-dump-migrate")]
#[command(about = "Migrate a PostgreSQL database with pg_dump and pg_restore")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml", env = "PGDM_CONFIG")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full migration
    Run {
        /// Override parallel jobs passed to pg_dump/pg_restore
        #[arg(long, env = "PGDM_JOBS")]
        jobs: Option<usize>,

        /// Override the dump directory
        #[arg(long, env = "PGDM_DUMP_DIR")]
        dump_dir: Option<PathBuf>,

        /// Restore data in one transaction (disables parallel restore)
        #[arg(long)]
        single_transaction: bool,

        /// Dry run: validate and show the steps without executing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Test database connections
    HealthCheck,

    /// Drop all tables, sequences and enum types from the destination schemas
    Clean {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Create or edit a configuration file interactively
    Init {
        /// Output path for configuration file [default: config.yaml]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Force overwrite existing file without confirmation
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    // Handle init command separately (doesn't need existing config)
    if let Commands::Init { output, force } = cli.command {
        // No logging setup for wizard - keeps terminal clean for interactive prompts
        let output_path = output.unwrap_or_else(|| PathBuf::from("config.yaml"));
        return wizard::run_wizard(&output_path, force)
            .await
            .map_err(|e| MigrateError::Config(e.to_string()));
    }

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Init { .. } => unreachable!(), // Handled above
        Commands::Run {
            jobs,
            dump_dir,
            single_transaction,
            dry_run,
        } => {
            // Apply overrides
            if let Some(j) = jobs {
                config.migration.jobs = Some(j);
            }
            if let Some(dir) = dump_dir {
                config.migration.dump_dir = Some(dir);
            }
            if single_transaction {
                config.migration.single_transaction = true;
            }
            config.validate()?;
            let config = config.with_auto_tuning();

            let orchestrator = Orchestrator::new(config)?;

            if dry_run {
                let plan = orchestrator.plan();
                if cli.output_json {
                    println!("{}", serde_json::to_string_pretty(&plan)?);
                } else {
                    println!("\nDry run: {} steps", plan.len());
                    for step in &plan {
                        println!("  {}. {}: {}", step.step, step.phase, step.description);
                    }
                }
                return Ok(());
            }

            let result = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nMigration completed!");
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Steps: {}", result.steps.len());
                println!("  Dump directory: {}", result.dump_dir);
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config)?;
            let result = orchestrator.health_check().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source: {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Destination: {} ({}ms)",
                    if result.destination_connected { "OK" } else { "FAILED" },
                    result.destination_latency_ms
                );
                if let Some(ref err) = result.destination_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                let (endpoint, message) = match (&result.source_error, &result.destination_error) {
                    (Some(err), _) => ("source", err.clone()),
                    (None, Some(err)) => ("destination", err.clone()),
                    (None, None) => ("destination", "unreachable".to_string()),
                };
                return Err(MigrateError::connectivity(endpoint, message));
            }
        }

        Commands::Clean { yes } => {
            if !yes {
                let proceed = Confirm::new()
                    .with_prompt(format!(
                        "Drop all objects in {:?} on {}?",
                        config.migration.schemas,
                        config.destination.describe()
                    ))
                    .default(false)
                    .interact()
                    .map_err(|e| MigrateError::Config(e.to_string()))?;
                if !proceed {
                    println!("Aborted");
                    return Ok(());
                }
            }

            let orchestrator = Orchestrator::new(config)?;
            orchestrator.clean_destination().await?;
            println!("Destination cleaned");
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
