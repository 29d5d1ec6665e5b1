//! Node definitions.
//!
//! Nodes are the agents of the pipeline. Each node reads the workflow state,
//! performs its role (usually one LLM call plus optional side effects) and
//! returns a [`StateDelta`] with the fields it changed.
//!
//! # Example
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use forja_core::{CoreResult, Node, NodeId, StateDelta, WorkflowState};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Node for Echo {
//!     fn id(&self) -> NodeId { NodeId::Developer }
//!     fn description(&self) -> &str { "Copies the prompt into the code field" }
//!
//!     async fn run(&self, state: &WorkflowState) -> CoreResult<StateDelta> {
//!         Ok(StateDelta {
//!             generated_code: Some(state.initial_prompt.clone()),
//!             ..Default::default()
//!         })
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::delta::StateDelta;
use crate::error::CoreResult;
use crate::state::WorkflowState;

/// Identifiers of the seven pipeline nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    RequirementsManager,
    Developer,
    QualityGate,
    TestAgent,
    Reviewer,
    Merge,
    Stakeholder,
}

impl NodeId {
    pub const ALL: [NodeId; 7] = [
        NodeId::RequirementsManager,
        NodeId::Developer,
        NodeId::QualityGate,
        NodeId::TestAgent,
        NodeId::Reviewer,
        NodeId::Merge,
        NodeId::Stakeholder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::RequirementsManager => "requirements_manager",
            NodeId::Developer => "developer",
            NodeId::QualityGate => "quality_gate",
            NodeId::TestAgent => "test_agent",
            NodeId::Reviewer => "reviewer",
            NodeId::Merge => "merge",
            NodeId::Stakeholder => "stakeholder",
        }
    }

    /// Name used in log lines and progress output.
    pub fn display_name(&self) -> &'static str {
        match self {
            NodeId::RequirementsManager => "RequirementsManager",
            NodeId::Developer => "Developer",
            NodeId::QualityGate => "QualityGate",
            NodeId::TestAgent => "TestAgent",
            NodeId::Reviewer => "Reviewer",
            NodeId::Merge => "Merge",
            NodeId::Stakeholder => "Stakeholder",
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Trait for node implementations.
///
/// Nodes must be `Send + Sync` so they can be shared through the registry.
/// A node must not mutate the state it is given; all writes go through the
/// returned delta, which the executor applies atomically.
#[async_trait]
pub trait Node: Send + Sync {
    /// The graph position this node fills.
    fn id(&self) -> NodeId;

    /// Human-readable description of the node's role.
    fn description(&self) -> &str;

    /// Run the node against the current state.
    ///
    /// Recoverable failures are lowered into the delta. An `Err` aborts the run.
    async fn run(&self, state: &WorkflowState) -> CoreResult<StateDelta>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_names() {
        assert_eq!(NodeId::QualityGate.as_str(), "quality_gate");
        assert_eq!(NodeId::QualityGate.to_string(), "QualityGate");
        assert_eq!(NodeId::ALL.len(), 7);
        assert_eq!(
            serde_json::to_string(&NodeId::TestAgent).unwrap(),
            "\"test_agent\""
        );
    }
}
