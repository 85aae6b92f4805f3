//! Error types for the migration library.

use std::path::PathBuf;

use thiserror::Error;

use crate::orchestrator::Phase;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code when an endpoint cannot be reached.
pub const EXIT_CONNECTIVITY_ERROR: u8 = 2;
/// Exit code for failed administrative SQL.
pub const EXIT_ADMIN_SQL_ERROR: u8 = 3;
/// Exit code when pg_dump/pg_restore fails or cannot be launched.
pub const EXIT_TOOL_ERROR: u8 = 4;
/// Exit code for filesystem and other IO failures.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// An endpoint could not be reached or rejected the liveness probe.
    #[error("{endpoint} database is unreachable: {message}")]
    Connectivity { endpoint: String, message: String },

    /// Administrative SQL failed on an open session.
    #[error("Administrative SQL failed: {0}")]
    AdminSql(#[from] tokio_postgres::Error),

    /// External tool exited with a non-zero status.
    #[error("{program} exited with {status}{}", format_stderr_tail(.stderr_tail))]
    Tool {
        program: String,
        status: String,
        stderr_tail: Vec<String>,
    },

    /// External tool could not be started.
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Dump directory could not be removed or created.
    #[error("Filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An orchestrated phase failed; the run was aborted.
    #[error("{phase} failed")]
    Step {
        phase: Phase,
        #[source]
        source: Box<MigrateError>,
    },
}

fn format_stderr_tail(lines: &[String]) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        format!(": {}", lines.join(" | "))
    }
}

impl MigrateError {
    /// Create a Connectivity error for a named endpoint.
    pub fn connectivity(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Connectivity {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a Filesystem error for a path.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MigrateError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Tag an error with the phase it aborted.
    pub fn at(self, phase: Phase) -> Self {
        MigrateError::Step {
            phase,
            source: Box::new(self),
        }
    }

    /// The phase that failed, if this error came out of an orchestrated run.
    pub fn failed_phase(&self) -> Option<Phase> {
        match self {
            MigrateError::Step { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::Connectivity { .. } => EXIT_CONNECTIVITY_ERROR,
            MigrateError::AdminSql(_) => EXIT_ADMIN_SQL_ERROR,
            MigrateError::Tool { .. } | MigrateError::Spawn { .. } => EXIT_TOOL_ERROR,
            MigrateError::Filesystem { .. } | MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::Step { source, .. } => source.exit_code(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_reports_inner_exit_code() {
        let err = MigrateError::Tool {
            program: "pg_restore".into(),
            status: "exit status: 1".into(),
            stderr_tail: vec![],
        }
        .at(Phase::RestoringSchema);

        assert_eq!(err.exit_code(), EXIT_TOOL_ERROR);
        assert_eq!(err.failed_phase(), Some(Phase::RestoringSchema));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            MigrateError::connectivity("destination", "refused").exit_code(),
            EXIT_CONNECTIVITY_ERROR
        );
        assert_eq!(
            MigrateError::filesystem("/tmp/x", std::io::Error::other("denied")).exit_code(),
            EXIT_IO_ERROR
        );
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let err = MigrateError::connectivity("destination", "connection refused")
            .at(Phase::CheckingConnectivity);
        let detailed = err.format_detailed();

        assert!(detailed.contains("Connectivity check failed"));
        assert!(detailed.contains("Caused by:"));
        assert!(detailed.contains("destination database is unreachable: connection refused"));
    }

    #[test]
    fn test_tool_error_includes_stderr_tail() {
        let err = MigrateError::Tool {
            program: "pg_dump".into(),
            status: "exit status: 1".into(),
            stderr_tail: vec!["pg_dump: error: connection failed".into()],
        };
        assert_eq!(
            err.to_string(),
            "pg_dump exited with exit status: 1: pg_dump: error: connection failed"
        );
    }
}
