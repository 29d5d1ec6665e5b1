//! # forja_runner
//!
//! Sandbox runner for generated unit tests.
//!
//! The generated code and its tests are written into the artifact directory
//! and the language's test runner is started there as a child process with a
//! hard timeout. The output is parsed for pass/fail counts and failed runs are
//! classified as a production-code or a test-code fault.
//!
//! # Features
//!
//! - **Process Runner**: `tokio::process` execution with kill-on-timeout
//! - **Dry-Run Mode**: Log commands without executing them
//! - **Sandbox**: vitest and pytest dispatch, manifest bootstrap, forced English locale
//! - **Stats**: vitest/pytest summary parsing with a symbol-count fallback
//! - **Classifier**: Heuristics separating test-file faults from code faults
//! - **Post-processing**: Float-assertion fix-ups for generated vitest files
//! - **Mock Runner**: Queued responses and captured calls for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use forja_core::Language;
//! use forja_runner::{classify, ProcessRunner, ProcessRunnerOptions, Sandbox};
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = Arc::new(ProcessRunner::new(ProcessRunnerOptions::default()));
//!     let sandbox = Sandbox::new("output", runner);
//!
//!     let run = sandbox.run_tests(Language::Python, "test_sumar.py").await;
//!     println!("{}: {}", run.outcome.as_str(), run.stats.summary());
//!     if !run.passed() {
//!         let verdict = classify(Language::Python, &run.output, "test_sumar.py");
//!         println!("fault: {} ({})", verdict.kind, verdict.reason);
//!     }
//! }
//! ```

pub mod classifier;
pub mod error;
pub mod mock;
pub mod postprocess;
pub mod process;
pub mod runner;
pub mod sandbox;
pub mod stats;

pub use classifier::{classify, Classification, FailureKind};
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use postprocess::{format_float_literal, postprocess_typescript_tests, MAX_TEST_DECIMALS};
pub use process::{ProcessRunner, ProcessRunnerOptions};
pub use runner::{CommandRunner, CommandSpec, ExecutionResult};
pub use sandbox::{vitest_manifest, Sandbox, TestRun};
pub use stats::{parse_pytest, parse_stats, parse_vitest, strip_ansi, TestStats};
