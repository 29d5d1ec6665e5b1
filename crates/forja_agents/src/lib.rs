//! # forja_agents
//!
//! The seven agents of the Forja pipeline and the glue that runs them.
//!
//! Each agent is a [`forja_core::Node`]: it reads the workflow state, calls
//! the LLM gateway and its collaborators, and returns a partial state update.
//! Routing between agents lives in [`forja_core::Graph::pipeline`].
//!
//! ## Agents
//!
//! | Agent | Writes |
//! |-------|--------|
//! | [`RequirementsManager`] | Formal requirements, PBI |
//! | [`Developer`] | Production code, branch, tasks |
//! | [`QualityGate`] | Static-analysis verdict, correction instructions |
//! | [`TestAgent`] | Unit tests, test verdict, pull request |
//! | [`Reviewer`] | Review verdict, PR review |
//! | [`Merge`] | Squash merge |
//! | [`Stakeholder`] | Business validation, release note |
//!
//! Collaborator failures never abort a run: agents log them and skip the
//! side effect. Only fatal LLM errors and local I/O errors surface.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use forja_agents::{AgentServices, Pipeline};
//! use forja_core::Settings;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let services = AgentServices::from_settings(Settings::from_env())?;
//! let pipeline = Pipeline::new(Arc::new(services));
//! let log = pipeline.run("Sumar dos números en Python", None).await?;
//! println!("{:?}", log.terminal);
//! # Ok(())
//! # }
//! ```

pub mod developer;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod quality_gate;
pub mod requirements_manager;
pub mod reviewer;
pub mod services;
pub mod stakeholder;
pub mod test_agent;
pub mod tracking;

#[cfg(test)]
mod testing;

pub use developer::Developer;
pub use error::{AgentError, AgentResult};
pub use merge::Merge;
pub use pipeline::{build_registry, Pipeline};
pub use quality_gate::QualityGate;
pub use requirements_manager::{parse_requirements, RequirementsManager};
pub use reviewer::{ReviewVerdict, Reviewer};
pub use services::AgentServices;
pub use stakeholder::{parse_validation, Stakeholder, Validation};
pub use test_agent::TestAgent;
