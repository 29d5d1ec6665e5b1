//! Language-dispatched test sandbox.
//!
//! The sandbox is the artifact directory: the code under test and its test
//! file are written side by side and the language's test runner is started
//! there with a hard timeout.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use forja_core::{Language, TestOutcome};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, CommandSpec};
use crate::stats::{parse_stats, strip_ansi, TestStats};

/// Manifest written when the sandbox has no `package.json`.
pub fn vitest_manifest() -> serde_json::Value {
    json!({
        "name": "capstone-tests",
        "version": "1.0.0",
        "type": "module",
        "devDependencies": {
            "vitest": "^4.0.15"
        }
    })
}

/// Result of one sandboxed test run.
#[derive(Debug, Clone, Serialize)]
pub struct TestRun {
    #[serde(serialize_with = "serialize_outcome")]
    pub outcome: TestOutcome,
    pub stats: TestStats,
    /// Combined stdout and stderr, ANSI-stripped
    pub output: String,
    /// Failure text for the developer; empty on pass
    pub traceback: String,
    pub duration_ms: u64,
}

fn serialize_outcome<S: serde::Serializer>(outcome: &TestOutcome, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(outcome.as_str())
}

impl TestRun {
    pub fn passed(&self) -> bool {
        self.outcome == TestOutcome::Passed
    }

    fn from_error(error: &RunnerError, spec: &CommandSpec) -> Self {
        let (output, traceback) = match error {
            RunnerError::Timeout(secs) => (
                format!("Timeout: los tests tardaron más de {} segundos", secs),
                format!("TimeoutError: Test execution exceeded {} seconds", secs),
            ),
            RunnerError::ProgramNotFound { program, message } => (
                format!(
                    "{} no está instalado o no está en el PATH.\nComando: {}",
                    program,
                    spec.display()
                ),
                format!("FileNotFoundError: {} command not found - {}", program, message),
            ),
            other => (
                format!("Error inesperado al ejecutar los tests:\n{}", other),
                format!("Exception: {}", other),
            ),
        };
        Self {
            outcome: TestOutcome::Error,
            stats: TestStats::default(),
            output,
            traceback,
            duration_ms: 0,
        }
    }
}

/// Runs generated unit tests for either target language.
pub struct Sandbox {
    dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    python: String,
}

impl Sandbox {
    pub fn new(dir: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            dir: dir.into(),
            runner,
            timeout: Duration::from_secs(60),
            python: "python".to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Interpreter used to start pytest.
    pub fn with_python(mut self, program: impl Into<String>) -> Self {
        self.python = program.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `package.json` for vitest unless one exists. Returns whether it was created.
    pub fn ensure_manifest(&self) -> RunnerResult<bool> {
        let path = self.dir.join("package.json");
        if path.exists() {
            return Ok(false);
        }
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, serde_json::to_string_pretty(&vitest_manifest())?)?;
        info!("Created {:?} for vitest", path);
        Ok(true)
    }

    /// Write a file into the sandbox.
    pub fn write_file(&self, name: &str, contents: &str) -> RunnerResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        fs::write(&path, contents)?;
        debug!("Wrote sandbox file {:?}", path);
        Ok(path)
    }

    /// Programs the test commands start, with whether each can be run here.
    pub async fn toolchain(&self) -> Vec<(String, bool)> {
        let mut status = Vec::new();
        for program in ["npx", self.python.as_str()] {
            status.push((program.to_string(), self.runner.is_available(program).await));
        }
        status
    }

    /// The test command for a language and test file name.
    pub fn command(&self, language: Language, test_file: &str) -> CommandSpec {
        let spec = match language {
            Language::TypeScript => CommandSpec::new("npx")
                .args(["vitest", "run", test_file, "--reporter=verbose"])
                .env("LANG", "en_US.UTF-8")
                .env("LC_ALL", "en_US.UTF-8"),
            Language::Python => CommandSpec::new(&self.python)
                .args(["-m", "pytest", test_file, "-v", "--tb=short"]),
        };
        spec.workdir(&self.dir).timeout(self.timeout)
    }

    /// Run the tests in `test_file`. Runner failures become an `ERROR` outcome.
    pub async fn run_tests(&self, language: Language, test_file: &str) -> TestRun {
        if language == Language::TypeScript {
            if let Err(e) = self.ensure_manifest() {
                warn!("Could not write package.json: {}", e);
            }
        }

        let spec = self.command(language, test_file);
        info!("Running {} tests: {}", language.test_framework(), spec.display());

        let result = match self.runner.run(&spec).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Test execution failed: {}", e);
                return TestRun::from_error(&e, &spec);
            }
        };

        let output = strip_ansi(&result.combined_output());
        let stats = parse_stats(language, &output);
        let passed = result.success();
        let traceback = if passed {
            String::new()
        } else if result.stderr.trim().is_empty() {
            output.clone()
        } else {
            strip_ansi(&result.stderr)
        };

        info!(
            "Tests {} in {}ms ({})",
            if passed { "passed" } else { "failed" },
            result.duration_ms,
            stats.summary()
        );

        TestRun {
            outcome: if passed { TestOutcome::Passed } else { TestOutcome::Failed },
            stats,
            output,
            traceback,
            duration_ms: result.duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockResponse, MockRunner};
    use tempfile::TempDir;

    #[test]
    fn test_typescript_command() {
        let temp = TempDir::new().unwrap();
        let sandbox = Sandbox::new(temp.path(), Arc::new(MockRunner::new()))
            .with_timeout(Duration::from_secs(30));
        let spec = sandbox.command(Language::TypeScript, "sumar.spec.ts");

        assert_eq!(spec.program, "npx");
        assert_eq!(spec.args, vec!["vitest", "run", "sumar.spec.ts", "--reporter=verbose"]);
        assert_eq!(spec.env.get("LC_ALL").map(String::as_str), Some("en_US.UTF-8"));
        assert_eq!(spec.workdir.as_deref(), Some(temp.path()));
        assert_eq!(spec.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_python_command() {
        let sandbox = Sandbox::new("/tmp/out", Arc::new(MockRunner::new())).with_python("python3");
        let spec = sandbox.command(Language::Python, "test_sumar.py");
        assert_eq!(spec.display(), "python3 -m pytest test_sumar.py -v --tb=short");
    }

    #[test]
    fn test_manifest_written_once() {
        let temp = TempDir::new().unwrap();
        let sandbox = Sandbox::new(temp.path(), Arc::new(MockRunner::new()));

        assert!(sandbox.ensure_manifest().unwrap());
        assert!(!sandbox.ensure_manifest().unwrap());

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join("package.json")).unwrap()).unwrap();
        assert_eq!(written, vitest_manifest());
    }

    #[tokio::test]
    async fn test_passing_run() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new().add_response(MockResponse::success(
            "test_sumar.py::test_a PASSED\n\x1b[32m2 passed in 0.01s\x1b[0m",
        ));
        let sandbox = Sandbox::new(temp.path(), Arc::new(runner));

        let run = sandbox.run_tests(Language::Python, "test_sumar.py").await;
        assert!(run.passed());
        assert_eq!(run.stats, TestStats::new(2, 0));
        assert!(run.traceback.is_empty());
        assert!(!run.output.contains('\x1b'));
    }

    #[tokio::test]
    async fn test_failing_run_uses_stdout_as_traceback() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new().add_response(MockResponse::failure(
            1,
            "E       assert 6 == 5\n1 failed, 1 passed in 0.02s",
            "",
        ));
        let sandbox = Sandbox::new(temp.path(), Arc::new(runner));

        let run = sandbox.run_tests(Language::Python, "test_sumar.py").await;
        assert_eq!(run.outcome, TestOutcome::Failed);
        assert_eq!(run.stats, TestStats::new(1, 1));
        assert!(run.traceback.contains("assert 6 == 5"));
    }

    #[tokio::test]
    async fn test_timeout_becomes_error() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new().add_response(MockResponse::timeout());
        let sandbox = Sandbox::new(temp.path(), Arc::new(runner)).with_timeout(Duration::from_secs(5));

        let run = sandbox.run_tests(Language::TypeScript, "sumar.spec.ts").await;
        assert_eq!(run.outcome, TestOutcome::Error);
        assert_eq!(run.traceback, "TimeoutError: Test execution exceeded 5 seconds");
        assert!(temp.path().join("package.json").exists());
    }

    #[tokio::test]
    async fn test_missing_program_becomes_error() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new().add_response(MockResponse::not_found());
        let sandbox = Sandbox::new(temp.path(), Arc::new(runner));

        let run = sandbox.run_tests(Language::Python, "test_sumar.py").await;
        assert_eq!(run.outcome, TestOutcome::Error);
        assert!(run.traceback.starts_with("FileNotFoundError: python"));
    }

    #[tokio::test]
    async fn test_toolchain_reports_availability() {
        let sandbox = Sandbox::new("/tmp/out", Arc::new(MockRunner::new().set_available(false)))
            .with_python("python3");
        let status = sandbox.toolchain().await;
        assert_eq!(
            status,
            vec![("npx".to_string(), false), ("python3".to_string(), false)]
        );
    }
}
