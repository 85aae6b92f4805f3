//! External tool invocation.
//!
//! Each pg_dump/pg_restore call is a [`ToolInvocation`] with an explicit
//! argument list; a [`ToolRunner`] executes it and reports the exit status.

mod pg;
mod process;

pub use pg::{data_dump, data_restore, schema_dump, schema_restore};
pub use process::ProcessRunner;

use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;
use crate::orchestrator::Phase;

/// A fully specified external command.
#[derive(Clone)]
pub struct ToolInvocation {
    /// Phase this invocation belongs to.
    pub phase: Phase,
    /// Binary to execute.
    pub program: PathBuf,
    /// Arguments, in order.
    pub args: Vec<OsString>,
    /// Extra environment. Values are never displayed.
    pub envs: Vec<(String, String)>,
}

impl ToolInvocation {
    pub fn new(phase: Phase, program: impl Into<PathBuf>) -> Self {
        Self {
            phase,
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append an argument when `cond` holds.
    pub fn arg_if(self, cond: bool, arg: impl Into<OsString>) -> Self {
        if cond {
            self.arg(arg)
        } else {
            self
        }
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// File name of the program, for logs and errors.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Whether an argument is present verbatim.
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(&arg.to_string_lossy()))?;
        }
        Ok(())
    }
}

impl fmt::Debug for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolInvocation")
            .field("phase", &self.phase)
            .field("command", &self.to_string())
            .field(
                "envs",
                &self.envs.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=./:@,+".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Executes external tool invocations.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run to completion. Non-zero exit is an error.
    async fn run(&self, invocation: &ToolInvocation) -> Result<()>;
}
