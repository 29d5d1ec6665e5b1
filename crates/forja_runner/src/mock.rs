//! Mock command runner for testing.
//!
//! Provides a configurable implementation of [`CommandRunner`] that captures
//! every call and returns queued responses without starting processes.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, CommandSpec, ExecutionResult};

/// Predefined mock response for a command execution.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Output {
        exit_code: i64,
        stdout: String,
        stderr: String,
        duration_ms: u64,
    },
    Timeout,
    NotFound,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self::Output {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
        }
    }

    pub fn failure(exit_code: i64, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Output {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration_ms: 100,
        }
    }

    pub fn timeout() -> Self {
        Self::Timeout
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl CapturedCall {
    /// Program and arguments joined with spaces.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Mock command runner for testing.
///
/// Responses are consumed in order; once the queue is empty the default
/// response (a successful empty run unless changed) is returned.
#[derive(Clone)]
pub struct MockRunner {
    /// Whether programs should report as available.
    available: Arc<RwLock<bool>>,
    /// Queued responses for run calls.
    responses: Arc<RwLock<VecDeque<MockResponse>>>,
    /// Response once the queue is drained.
    default_response: Arc<RwLock<MockResponse>>,
    /// Captured calls for verification.
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Simulated failure to return (as a string message for ExecutionFailed).
    simulate_failure: Arc<RwLock<Option<String>>>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self {
            available: Arc::new(RwLock::new(true)),
            responses: Arc::new(RwLock::new(VecDeque::new())),
            default_response: Arc::new(RwLock::new(MockResponse::success(""))),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            simulate_failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Set whether programs are available.
    pub fn set_available(self, available: bool) -> Self {
        *self.available.write() = available;
        self
    }

    /// Add a mock response for the next run call.
    pub fn add_response(self, response: MockResponse) -> Self {
        self.responses.write().push_back(response);
        self
    }

    /// Replace the queued responses.
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        *self.responses.write() = responses.into();
        self
    }

    /// Set the response used once the queue is empty.
    pub fn with_default(self, response: MockResponse) -> Self {
        *self.default_response.write() = response;
        self
    }

    /// Set a failure to simulate.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Check if a program was run.
    pub fn was_called(&self, program: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.program == program)
    }

    /// Responses still queued.
    pub fn pending(&self) -> usize {
        self.responses.read().len()
    }

    fn next_response(&self) -> MockResponse {
        let queued = self.responses.write().pop_front();
        queued.unwrap_or_else(|| self.default_response.read().clone())
    }

    fn check_failure(&self) -> RunnerResult<()> {
        if let Some(msg) = self.simulate_failure.read().clone() {
            return Err(RunnerError::ExecutionFailed(msg));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn is_available(&self, _program: &str) -> bool {
        *self.available.read()
    }

    async fn run(&self, spec: &CommandSpec) -> RunnerResult<ExecutionResult> {
        self.captured_calls.write().push(CapturedCall {
            program: spec.program.clone(),
            args: spec.args.clone(),
            workdir: spec.workdir.clone(),
            env: spec.env.clone(),
        });

        self.check_failure()?;

        match self.next_response() {
            MockResponse::Output {
                exit_code,
                stdout,
                stderr,
                duration_ms,
            } => {
                let started_at = Utc::now();
                let finished_at = started_at + chrono::Duration::milliseconds(duration_ms as i64);
                Ok(ExecutionResult {
                    exit_code,
                    stdout,
                    stderr,
                    started_at,
                    finished_at,
                    duration_ms,
                })
            }
            MockResponse::Timeout => Err(RunnerError::Timeout(spec.timeout.as_secs())),
            MockResponse::NotFound => Err(RunnerError::ProgramNotFound {
                program: spec.program.clone(),
                message: "mock: program not found".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_runner_basic() {
        let runner = MockRunner::new().add_response(MockResponse::success("test output"));

        let result = runner.run(&CommandSpec::new("echo").arg("hello")).await.unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "test output");
    }

    #[tokio::test]
    async fn test_mock_runner_captures_calls() {
        let runner = MockRunner::new();
        let spec = CommandSpec::new("python")
            .args(["-m", "pytest", "test_sumar.py"])
            .workdir("/app")
            .env("LANG", "en_US.UTF-8");

        let _ = runner.run(&spec).await;

        let calls = runner.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].command_line(), "python -m pytest test_sumar.py");
        assert_eq!(calls[0].workdir.as_deref(), Some(std::path::Path::new("/app")));
        assert!(runner.was_called("python"));
    }

    #[tokio::test]
    async fn test_mock_runner_queue_then_default() {
        let runner = MockRunner::new()
            .with_responses(vec![
                MockResponse::success("first"),
                MockResponse::failure(1, "", "second failed"),
            ])
            .with_default(MockResponse::success("default"));
        let spec = CommandSpec::new("test");

        assert_eq!(runner.run(&spec).await.unwrap().stdout, "first");
        let second = runner.run(&spec).await.unwrap();
        assert_eq!(second.exit_code, 1);
        assert_eq!(second.stderr, "second failed");
        assert_eq!(runner.run(&spec).await.unwrap().stdout, "default");
        assert_eq!(runner.run(&spec).await.unwrap().stdout, "default");
        assert_eq!(runner.pending(), 0);
    }

    #[tokio::test]
    async fn test_mock_runner_errors() {
        let runner = MockRunner::new()
            .add_response(MockResponse::timeout())
            .add_response(MockResponse::not_found());
        let spec = CommandSpec::new("npx");

        assert!(matches!(runner.run(&spec).await, Err(RunnerError::Timeout(60))));
        assert!(matches!(runner.run(&spec).await, Err(RunnerError::ProgramNotFound { .. })));

        let failing = MockRunner::new().simulate_failure("simulated error");
        assert!(failing.run(&spec).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_runner_availability() {
        assert!(MockRunner::new().set_available(true).is_available("npx").await);
        assert!(!MockRunner::new().set_available(false).is_available("npx").await);
    }
}
