//! Local process runner built on `tokio::process`.

use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, CommandSpec, ExecutionResult};

/// Process runner options.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunnerOptions {
    /// Log commands without executing them
    pub dry_run: bool,
}

impl ProcessRunnerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Runs sandbox commands as child processes of the current host.
///
/// Children are killed when their timeout expires.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    options: ProcessRunnerOptions,
}

impl ProcessRunner {
    pub fn new(options: ProcessRunnerOptions) -> Self {
        Self { options }
    }

    /// Check if dry-run mode is enabled.
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.workdir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn is_available(&self, program: &str) -> bool {
        Command::new(program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn run(&self, spec: &CommandSpec) -> RunnerResult<ExecutionResult> {
        let started_at = Utc::now();
        let start = Instant::now();

        if self.options.dry_run {
            info!("[dry-run] {}", spec.display());
            return Ok(ExecutionResult {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                started_at,
                finished_at: Utc::now(),
                duration_ms: 0,
            });
        }

        debug!(
            "Executing: {} (cwd: {:?}, timeout: {}s)",
            spec.display(),
            spec.workdir,
            spec.timeout.as_secs()
        );

        let child = Self::command(spec).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RunnerError::ProgramNotFound {
                    program: spec.program.clone(),
                    message: e.to_string(),
                }
            } else {
                RunnerError::ExecutionFailed(format!("Failed to spawn {}: {}", spec.program, e))
            }
        })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| {
                RunnerError::ExecutionFailed(format!("Failed to wait for process: {}", e))
            })?,
            Err(_) => {
                warn!("Command timed out after {}s: {}", spec.timeout.as_secs(), spec.display());
                return Err(RunnerError::Timeout(spec.timeout.as_secs()));
            }
        };

        let exit_code = output.status.code().map_or(-1, i64::from);
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!("Command finished with exit code {} in {}ms", exit_code, duration_ms);

        Ok(ExecutionResult {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            started_at,
            finished_at: Utc::now(),
            duration_ms,
        })
    }
}
