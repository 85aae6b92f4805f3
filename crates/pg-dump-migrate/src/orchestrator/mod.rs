//! Migration orchestrator - main workflow coordinator.

mod phase;

pub use phase::Phase;

use crate::admin::{CleanupPlan, PgAdmin, SqlAdmin, DISABLE_CONSTRAINTS_SQL, ENABLE_CONSTRAINTS_SQL};
use crate::config::{Config, EndpointConfig};
use crate::dump_dir::DumpDir;
use crate::error::{MigrateError, Result};
use crate::tools::{self, ProcessRunner, ToolRunner};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    dump_dir: DumpDir,
    admin: Arc<dyn SqlAdmin>,
    runner: Arc<dyn ToolRunner>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final phase (`done` on success).
    pub status: Phase,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Dump directory used for the run.
    pub dump_dir: String,

    /// Per-step outcome, in execution order.
    pub steps: Vec<StepReport>,
}

/// Outcome of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub step: usize,
    pub phase: Phase,
    pub duration_ms: u64,
}

/// A step as it would run, for dry runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStep {
    pub step: usize,
    pub phase: Phase,
    pub description: String,
}

/// Result of probing both endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub destination_connected: bool,
    pub destination_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator {
    /// Create an orchestrator using tokio-postgres admin sessions and real subprocesses.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_components(config, Arc::new(PgAdmin::new()), Arc::new(ProcessRunner::new()))
    }

    /// Create an orchestrator with explicit admin and tool runner implementations.
    pub fn with_components(
        config: Config,
        admin: Arc<dyn SqlAdmin>,
        runner: Arc<dyn ToolRunner>,
    ) -> Result<Self> {
        let dump_dir = DumpDir::new(config.migration.get_dump_dir()?);
        Ok(Self {
            config,
            dump_dir,
            admin,
            runner,
        })
    }

    /// The resolved dump directory.
    pub fn dump_dir(&self) -> &Path {
        self.dump_dir.path()
    }

    /// Run the migration, stopping at the first failed step.
    pub async fn run(&self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let total = Phase::STEPS.len();

        info!("Starting migration run: {}", run_id);
        info!(
            "Migrating {} -> {} using {} as the dump directory",
            self.config.source.describe(),
            self.config.destination.describe(),
            self.dump_dir.path().display()
        );

        let mut steps = Vec::with_capacity(total);
        let mut phase = Phase::Idle;

        while let Some(next) = phase.next() {
            phase = next;
            if phase.is_terminal() {
                break;
            }

            let step = phase.step_number().unwrap_or_default();
            info!("Step {}/{}: {}", step, total, phase);
            let step_start = Instant::now();

            if let Err(e) = self.execute(phase).await {
                error!("Step {}/{}: {} failed: {}", step, total, phase, e);
                let failed = phase;
                phase = phase.fail();
                error!(
                    "Migration {} aborted ({}); {} of {} steps completed",
                    run_id,
                    phase,
                    steps.len(),
                    total
                );
                return Err(e.at(failed));
            }

            let elapsed = step_start.elapsed();
            info!(
                "Step {}/{}: {} succeeded ({:.1}s)",
                step,
                total,
                phase,
                elapsed.as_secs_f64()
            );
            steps.push(StepReport {
                step,
                phase,
                duration_ms: elapsed.as_millis() as u64,
            });
        }

        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        info!(
            "Migration {} completed: {} steps in {:.1}s",
            run_id,
            steps.len(),
            duration_seconds
        );

        Ok(MigrationResult {
            run_id,
            status: phase,
            started_at,
            completed_at,
            duration_seconds,
            dump_dir: self.dump_dir.path().display().to_string(),
            steps,
        })
    }

    /// Describe every step without executing anything.
    pub fn plan(&self) -> Vec<PlannedStep> {
        Phase::STEPS
            .iter()
            .map(|&phase| PlannedStep {
                step: phase.step_number().unwrap_or_default(),
                phase,
                description: self.describe(phase),
            })
            .collect()
    }

    /// Probe both endpoints, reporting each independently.
    pub async fn health_check(&self) -> HealthCheckResult {
        let (source_connected, source_latency_ms, source_error) =
            self.probe(&self.config.source).await;
        let (destination_connected, destination_latency_ms, destination_error) =
            self.probe(&self.config.destination).await;

        HealthCheckResult {
            source_connected,
            source_latency_ms,
            source_error,
            destination_connected,
            destination_latency_ms,
            destination_error,
            healthy: source_connected && destination_connected,
        }
    }

    /// Drop user objects from the destination in one admin session.
    pub async fn clean_destination(&self) -> Result<()> {
        let plan = self.cleanup_plan();
        info!(
            "Cleaning destination schemas {:?} (sequences: {}, enum types: {})",
            plan.schemas, plan.drop_sequences, plan.drop_enum_types
        );
        self.admin
            .batch_execute(&self.config.destination, &plan.to_sql())
            .await
    }

    async fn execute(&self, phase: Phase) -> Result<()> {
        let dir = self.dump_dir.path();
        match phase {
            Phase::CheckingConnectivity => self.check_connectivity().await,
            Phase::CleaningDestination => self.clean_destination().await,
            Phase::ResettingDumpDir => self.dump_dir.reset().await,
            Phase::DumpingSchema => self.runner.run(&tools::schema_dump(&self.config, dir)).await,
            Phase::RestoringSchema => {
                self.runner
                    .run(&tools::schema_restore(&self.config, dir))
                    .await
            }
            Phase::DisablingConstraints => {
                // Session-scoped: pg_restore's --disable-triggers is what covers the load itself.
                debug!("session_replication_role applies to this admin session only");
                self.admin
                    .batch_execute(&self.config.destination, DISABLE_CONSTRAINTS_SQL)
                    .await
            }
            Phase::DumpingData => {
                // pg_dump creates the directory and rejects a non-empty one.
                if self.dump_dir.remove().await? {
                    info!("Removed dump directory before data dump");
                }
                self.runner.run(&tools::data_dump(&self.config, dir)).await
            }
            Phase::RestoringData => {
                if self.config.migration.single_transaction {
                    info!("Restoring data in a single transaction (parallel jobs disabled)");
                }
                self.runner.run(&tools::data_restore(&self.config, dir)).await
            }
            Phase::EnablingConstraints => {
                self.admin
                    .batch_execute(&self.config.destination, ENABLE_CONSTRAINTS_SQL)
                    .await
            }
            Phase::Idle | Phase::Done | Phase::Failed => Ok(()),
        }
    }

    async fn check_connectivity(&self) -> Result<()> {
        for (name, endpoint) in [
            ("source", &self.config.source),
            ("destination", &self.config.destination),
        ] {
            info!("Testing {} database connection ({})", name, endpoint.describe());
            self.admin
                .ping(endpoint)
                .await
                .map_err(|e| MigrateError::connectivity(name, e.to_string()))?;
            info!("{} database connection successful", name);
        }
        Ok(())
    }

    async fn probe(&self, endpoint: &EndpointConfig) -> (bool, u64, Option<String>) {
        let start = Instant::now();
        let outcome = self.admin.ping(endpoint).await;
        let latency = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => (true, latency, None),
            Err(e) => (false, latency, Some(e.to_string())),
        }
    }

    fn cleanup_plan(&self) -> CleanupPlan {
        CleanupPlan {
            schemas: self.config.migration.schemas.clone(),
            drop_sequences: self.config.migration.drop_sequences,
            drop_enum_types: self.config.migration.drop_enum_types,
        }
    }

    fn describe(&self, phase: Phase) -> String {
        let dir = self.dump_dir.path();
        match phase {
            Phase::CheckingConnectivity => format!(
                "SELECT 1 on source ({}) and destination ({})",
                self.config.source.describe(),
                self.config.destination.describe()
            ),
            Phase::CleaningDestination => {
                let plan = self.cleanup_plan();
                let mut objects = vec!["tables"];
                if plan.drop_sequences {
                    objects.push("sequences");
                }
                if plan.drop_enum_types {
                    objects.push("enum types");
                }
                format!(
                    "drop {} in schemas {} on {}",
                    objects.join(", "),
                    plan.schemas.join(", "),
                    self.config.destination.describe()
                )
            }
            Phase::ResettingDumpDir => format!("remove and recreate {}", dir.display()),
            Phase::DumpingSchema => tools::schema_dump(&self.config, dir).to_string(),
            Phase::RestoringSchema => tools::schema_restore(&self.config, dir).to_string(),
            Phase::DisablingConstraints => DISABLE_CONSTRAINTS_SQL.to_string(),
            Phase::DumpingData => format!(
                "remove {}, then {}",
                dir.display(),
                tools::data_dump(&self.config, dir)
            ),
            Phase::RestoringData => tools::data_restore(&self.config, dir).to_string(),
            Phase::EnablingConstraints => ENABLE_CONSTRAINTS_SQL.to_string(),
            Phase::Idle | Phase::Done | Phase::Failed => String::new(),
        }
    }
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolInvocation;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    type EventLog = Arc<Mutex<Vec<String>>>;

    struct FakeAdmin {
        log: EventLog,
        unreachable_ports: Vec<u16>,
        failing_sql: Option<&'static str>,
    }

    #[async_trait]
    impl SqlAdmin for FakeAdmin {
        async fn ping(&self, endpoint: &EndpointConfig) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("ping:{}", endpoint.port));
            if self.unreachable_ports.contains(&endpoint.port) {
                return Err(MigrateError::Io(std::io::Error::other("connection refused")));
            }
            Ok(())
        }

        async fn batch_execute(&self, endpoint: &EndpointConfig, sql: &str) -> Result<()> {
            let kind = if sql.starts_with("DO $$") {
                "cleanup"
            } else if sql == DISABLE_CONSTRAINTS_SQL {
                "disable"
            } else if sql == ENABLE_CONSTRAINTS_SQL {
                "enable"
            } else {
                "other"
            };
            self.log
                .lock()
                .unwrap()
                .push(format!("sql:{}:{}", endpoint.port, kind));
            if self.failing_sql == Some(kind) {
                return Err(MigrateError::Io(std::io::Error::other("permission denied")));
            }
            Ok(())
        }
    }

    struct FakeRunner {
        log: EventLog,
        fail_on: Option<Phase>,
    }

    fn file_arg(invocation: &ToolInvocation) -> Option<PathBuf> {
        invocation.args.iter().find_map(|a| {
            a.to_str()
                .and_then(|s| s.strip_prefix("--file="))
                .map(PathBuf::from)
        })
    }

    #[async_trait]
    impl ToolRunner for FakeRunner {
        async fn run(&self, invocation: &ToolInvocation) -> Result<()> {
            let mut entry = format!("{}:{:?}", invocation.program_name(), invocation.phase);
            // Simulate pg_dump writing its archive; record whether the directory pre-existed.
            if let Some(dir) = file_arg(invocation) {
                entry.push_str(if dir.exists() { ":dir-present" } else { ":dir-absent" });
                std::fs::create_dir_all(&dir).unwrap();
                std::fs::write(dir.join("toc.dat"), b"toc").unwrap();
            }
            self.log.lock().unwrap().push(entry);

            if self.fail_on == Some(invocation.phase) {
                return Err(MigrateError::Tool {
                    program: invocation.program_name(),
                    status: "exit status: 1".into(),
                    stderr_tail: vec!["pg_restore: error: could not read TOC".into()],
                });
            }
            Ok(())
        }
    }

    fn config(dump_dir: &Path) -> Config {
        let mut config = Config::from_yaml(
            r#"
source:
  host: localhost
  port: 5433
  database: unbadged-db
  user: flipopay
  password: secret
destination:
  host: localhost
  port: 5434
  database: pg
  user: zeuz
  password: secret
migration:
  jobs: 4
"#,
        )
        .unwrap();
        config.migration.dump_dir = Some(dump_dir.to_path_buf());
        config
    }

    fn orchestrator(
        dump_dir: &Path,
        unreachable_ports: Vec<u16>,
        failing_sql: Option<&'static str>,
        fail_on: Option<Phase>,
    ) -> (Orchestrator, EventLog) {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let admin = FakeAdmin {
            log: log.clone(),
            unreachable_ports,
            failing_sql,
        };
        let runner = FakeRunner {
            log: log.clone(),
            fail_on,
        };
        let orch =
            Orchestrator::with_components(config(dump_dir), Arc::new(admin), Arc::new(runner))
                .unwrap();
        (orch, log)
    }

    fn events(log: &EventLog) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_full_run_executes_steps_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let dump_dir = tmp.path().join("backup_dir");
        let (orch, log) = orchestrator(&dump_dir, vec![], None, None);

        let result = orch.run().await.unwrap();

        assert_eq!(result.status, Phase::Done);
        assert_eq!(
            result.steps.iter().map(|s| s.phase).collect::<Vec<_>>(),
            Phase::STEPS.to_vec()
        );
        assert_eq!(
            events(&log),
            vec![
                "ping:5433",
                "ping:5434",
                "sql:5434:cleanup",
                "pg_dump:DumpingSchema:dir-present",
                "pg_restore:RestoringSchema",
                "sql:5434:disable",
                "pg_dump:DumpingData:dir-absent",
                "pg_restore:RestoringData",
                "sql:5434:enable",
            ]
        );
        assert!(dump_dir.join("toc.dat").exists());
    }

    #[tokio::test]
    async fn test_destination_unreachable_aborts_before_mutation() {
        let tmp = tempfile::tempdir().unwrap();
        let dump_dir = tmp.path().join("backup_dir");
        let (orch, log) = orchestrator(&dump_dir, vec![5434], None, None);

        let err = orch.run().await.unwrap_err();

        assert_eq!(err.failed_phase(), Some(Phase::CheckingConnectivity));
        assert_eq!(err.exit_code(), crate::error::EXIT_CONNECTIVITY_ERROR);
        assert!(err.format_detailed().contains("destination database is unreachable"));
        assert_eq!(events(&log), vec!["ping:5433", "ping:5434"]);
        assert!(!dump_dir.exists());
    }

    #[tokio::test]
    async fn test_source_unreachable_skips_destination_probe() {
        let tmp = tempfile::tempdir().unwrap();
        let (orch, log) = orchestrator(&tmp.path().join("backup_dir"), vec![5433], None, None);

        let err = orch.run().await.unwrap_err();

        assert!(err.format_detailed().contains("source database is unreachable"));
        assert_eq!(events(&log), vec!["ping:5433"]);
    }

    #[tokio::test]
    async fn test_schema_restore_failure_skips_data_steps() {
        let tmp = tempfile::tempdir().unwrap();
        let (orch, log) = orchestrator(
            &tmp.path().join("backup_dir"),
            vec![],
            None,
            Some(Phase::RestoringSchema),
        );

        let err = orch.run().await.unwrap_err();

        assert_eq!(err.failed_phase(), Some(Phase::RestoringSchema));
        assert_eq!(err.exit_code(), crate::error::EXIT_TOOL_ERROR);
        let events = events(&log);
        assert_eq!(events.last().unwrap(), "pg_restore:RestoringSchema");
        assert!(!events.iter().any(|e| e.contains("Data")));
        assert!(!events.iter().any(|e| e.ends_with(":disable")));
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let dump_dir = tmp.path().join("backup_dir");
        let (orch, log) = orchestrator(&dump_dir, vec![], Some("cleanup"), None);

        let err = orch.run().await.unwrap_err();

        assert_eq!(err.failed_phase(), Some(Phase::CleaningDestination));
        assert_eq!(events(&log).len(), 3);
        assert!(!dump_dir.exists());
    }

    #[tokio::test]
    async fn test_data_restore_failure_leaves_constraints_step_unrun() {
        let tmp = tempfile::tempdir().unwrap();
        let (orch, log) = orchestrator(
            &tmp.path().join("backup_dir"),
            vec![],
            None,
            Some(Phase::RestoringData),
        );

        let err = orch.run().await.unwrap_err();

        assert_eq!(err.failed_phase(), Some(Phase::RestoringData));
        assert!(!events(&log).iter().any(|e| e.ends_with(":enable")));
    }

    #[tokio::test]
    async fn test_rerun_issues_identical_work() {
        let tmp = tempfile::tempdir().unwrap();
        let (orch, log) = orchestrator(&tmp.path().join("backup_dir"), vec![], None, None);

        orch.run().await.unwrap();
        let first = events(&log);
        log.lock().unwrap().clear();
        orch.run().await.unwrap();

        assert_eq!(events(&log), first);
    }

    #[tokio::test]
    async fn test_health_check_reports_both_endpoints() {
        let tmp = tempfile::tempdir().unwrap();
        let (orch, log) = orchestrator(&tmp.path().join("backup_dir"), vec![5433], None, None);

        let health = orch.health_check().await;

        assert!(!health.source_connected);
        assert!(health.source_error.is_some());
        assert!(health.destination_connected);
        assert!(!health.healthy);
        assert_eq!(events(&log), vec!["ping:5433", "ping:5434"]);
    }

    #[tokio::test]
    async fn test_plan_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let dump_dir = tmp.path().join("backup_dir");
        let (orch, log) = orchestrator(&dump_dir, vec![], None, None);

        let plan = orch.plan();

        assert_eq!(plan.len(), 9);
        assert_eq!(plan[0].step, 1);
        assert!(plan[3].description.contains("--schema-only"));
        assert!(plan[7].description.contains("--disable-triggers"));
        assert!(plan.iter().all(|s| !s.description.contains("secret")));
        assert!(events(&log).is_empty());
        assert!(!dump_dir.exists());
    }

    #[test]
    fn test_result_json() {
        let now = Utc::now();
        let result = MigrationResult {
            run_id: "run-1".into(),
            status: Phase::Done,
            started_at: now,
            completed_at: now,
            duration_seconds: 1.5,
            dump_dir: "/tmp/backup_dir".into(),
            steps: vec![StepReport {
                step: 1,
                phase: Phase::CheckingConnectivity,
                duration_ms: 12,
            }],
        };
        let json = result.to_json().unwrap();
        assert!(json.contains("\"status\": \"done\""));
        assert!(json.contains("\"checking_connectivity\""));
    }

    /// End-to-end against two live servers.
    ///
    /// Run with: PGDM_TEST_SOURCE_PORT=5433 PGDM_TEST_DESTINATION_PORT=5434 \
    ///   cargo test -p pg-dump-migrate -- live_migration --ignored
    #[tokio::test]
    #[ignore] // Needs PostgreSQL servers and pg_dump/pg_restore on PATH
    async fn live_migration_copies_table_and_row() {
        let env = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.into());
        let tmp = tempfile::tempdir().unwrap();
        let yaml = format!(
            r#"
source:
  host: {host}
  port: {sport}
  database: {sdb}
  user: {user}
  password: {password}
destination:
  host: {host}
  port: {dport}
  database: {ddb}
  user: {user}
  password: {password}
migration:
  jobs: 2
  dump_dir: {dir}
"#,
            host = env("PGDM_TEST_HOST", "localhost"),
            sport = env("PGDM_TEST_SOURCE_PORT", "5433"),
            dport = env("PGDM_TEST_DESTINATION_PORT", "5434"),
            sdb = env("PGDM_TEST_SOURCE_DB", "postgres"),
            ddb = env("PGDM_TEST_DESTINATION_DB", "postgres"),
            user = env("PGDM_TEST_USER", "postgres"),
            password = env("PGDM_TEST_PASSWORD", "postgres"),
            dir = tmp.path().join("backup_dir").display(),
        );
        let config = Config::from_yaml(&yaml).expect("valid test config");

        let admin = PgAdmin::new();
        admin
            .batch_execute(
                &config.source,
                "DROP TABLE IF EXISTS pgdm_widgets; \
                 CREATE TABLE pgdm_widgets (id int PRIMARY KEY, name text NOT NULL); \
                 INSERT INTO pgdm_widgets VALUES (1, 'sprocket');",
            )
            .await
            .expect("seed source");

        let orch = Orchestrator::new(config.clone()).unwrap();
        orch.run().await.expect("first run");
        orch.run().await.expect("rerun is idempotent");

        admin
            .batch_execute(
                &config.destination,
                "DO $$ BEGIN \
                 IF (SELECT count(*) FROM pgdm_widgets WHERE id = 1 AND name = 'sprocket') <> 1 \
                 THEN RAISE EXCEPTION 'row missing'; END IF; END $$;",
            )
            .await
            .expect("destination has the migrated row");
        assert!(orch.dump_dir().join("toc.dat").exists());
    }
}
