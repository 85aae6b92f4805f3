//! Subprocess runner with streamed output.

use std::collections::VecDeque;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};

use super::{ToolInvocation, ToolRunner};

/// Default number of stderr lines kept for error reports.
const DEFAULT_STDERR_TAIL: usize = 20;

/// Runs tools as child processes, forwarding each output line to tracing.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    stderr_tail: usize,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            stderr_tail: DEFAULT_STDERR_TAIL,
        }
    }

    /// Keep at most `lines` of stderr for the failure message.
    pub fn with_stderr_tail(mut self, lines: usize) -> Self {
        self.stderr_tail = lines;
        self
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<()> {
        let program = invocation.program_name();
        info!("Running: {}", invocation);

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| MigrateError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (status, _, stderr_tail) = tokio::join!(
            child.wait(),
            forward_lines(stdout, &program, false, 0),
            forward_lines(stderr, &program, true, self.stderr_tail),
        );
        let status = status?;

        if status.success() {
            debug!("{} finished: {}", program, status);
            Ok(())
        } else {
            Err(MigrateError::Tool {
                program,
                status: status.to_string(),
                stderr_tail,
            })
        }
    }
}

/// Log every line of a child stream; return the last `keep` lines.
///
/// The stream is always read to EOF so the child never sees a closed pipe.
/// Lines that are not valid UTF-8 are logged lossily.
async fn forward_lines<R>(
    stream: Option<R>,
    program: &str,
    is_stderr: bool,
    keep: usize,
) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let Some(stream) = stream else {
        return Vec::new();
    };

    let mut tail = VecDeque::with_capacity(keep);
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if is_stderr {
                    info!(tool = program, stream = "stderr", "{}", line);
                } else {
                    info!(tool = program, stream = "stdout", "{}", line);
                }
                if keep > 0 {
                    if tail.len() == keep {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            Err(e) => {
                warn!("Failed to read {} output: {}; discarding the rest", program, e);
                if let Err(e) = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
                    warn!("Failed to drain {} output: {}", program, e);
                }
                break;
            }
        }
    }
    tail.into()
}
