//! # forja_core
//!
//! Core workflow engine for Forja.
//!
//! This crate provides the shared workflow state, the retry policy, the state
//! graph with its routers and the executor that drives a run from the user
//! prompt to a terminal edge.
//!
//! # Architecture
//!
//! - **State**: The typed record threaded through every node, with bounded counters
//! - **Nodes**: Role-bound units of work that return a partial state update
//! - **Graph**: Edges and routers between nodes, ending in a terminal label
//! - **Executor**: Runs the graph one node at a time with persistence and progress events
//! - **Artifacts**: Deterministic artifact names and the per-run output directory
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use forja_core::{Graph, GraphExecutor, NodeRegistry, Settings, WorkflowState};
//!
//! let settings = Settings::from_env();
//! let mut registry = NodeRegistry::new();
//! registry.register(Arc::new(MyRequirementsNode));
//! // ... register the other six nodes
//!
//! let executor = GraphExecutor::new(
//!     Arc::new(registry),
//!     Arc::new(Graph::pipeline()),
//!     settings.output_dir.join("logs"),
//! );
//! let log = executor
//!     .run(WorkflowState::new("Sum two numbers in Python", &settings.budgets))
//!     .await?;
//! println!("{}", log.terminal.unwrap());
//! ```

pub mod artifacts;
pub mod config;
pub mod delta;
pub mod error;
pub mod executor;
pub mod graph;
pub mod language;
pub mod naming;
pub mod node;
pub mod registry;
pub mod requirements;
pub mod state;
pub mod validator;

// Re-export main types for convenience
pub use artifacts::{names, strip_code_fences, snake_case, ArtifactStore, MergeOutcome, TestOutcome};
pub use config::{CloudQualitySettings, LlmSettings, RetryBudgets, ScmSettings, Settings, Timeouts, TrackerSettings};
pub use delta::StateDelta;
pub use error::{CoreError, CoreResult};
pub use executor::{visit_limit, ExecutionLog, GraphExecutor, RunStatus, StepEvent, VisitRecord};
pub use graph::{Edge, Graph, RouteLabel, Router, Target, Terminal};
pub use language::Language;
pub use naming::{developer_branch, sanitize_ref_name, tests_branch};
pub use node::{Node, NodeId};
pub use registry::NodeRegistry;
pub use requirements::{FormalRequirements, TestCase, TrackerRef, PARSE_ERROR_MARKER};
pub use state::{Counter, RetryCounters, WorkflowState};
pub use validator::{check_test_file, Completeness};
