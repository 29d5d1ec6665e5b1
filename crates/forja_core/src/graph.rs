//! Graph topology and routers.
//!
//! Edges are either unconditional or governed by a router, a pure function
//! from the state to a [`RouteLabel`]. Each conditional edge maps labels to
//! a [`Target`]: another node or the end of the run with a [`Terminal`].
//!
//! Routers only read counters; nodes are the only writers. Every retry edge is
//! guarded by a bounded counter and paired with a terminal edge for when the
//! bound is reached.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::node::NodeId;
use crate::registry::NodeRegistry;
use crate::state::WorkflowState;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Terminal {
    Success,
    QualityLimitExceeded,
    DebugLimitExceeded,
    ReviewLimitExceeded,
    MergeFailed,
    FinalFailure,
}

impl Terminal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Terminal::Success => "success",
            Terminal::QualityLimitExceeded => "quality-limit-exceeded",
            Terminal::DebugLimitExceeded => "debug-limit-exceeded",
            Terminal::ReviewLimitExceeded => "review-limit-exceeded",
            Terminal::MergeFailed => "merge-failed",
            Terminal::FinalFailure => "final-failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Terminal::Success)
    }
}

impl std::fmt::Display for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Labels produced by routers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteLabel {
    /// The gate admitted the state.
    Passed,
    /// The gate rejected and budget remains.
    Retry,
    /// The gate rejected and the budget is spent.
    Exhausted,
    /// A non-retryable failure.
    Failed,
}

impl RouteLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteLabel::Passed => "passed",
            RouteLabel::Retry => "retry",
            RouteLabel::Exhausted => "exhausted",
            RouteLabel::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RouteLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where an edge leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Node(NodeId),
    End(Terminal),
}

/// A router inspects the state and names the outgoing edge.
pub type Router = fn(&WorkflowState) -> RouteLabel;

/// Outgoing edge of a node.
#[derive(Clone)]
pub enum Edge {
    Always(Target),
    Conditional {
        router: Router,
        routes: HashMap<RouteLabel, Target>,
    },
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Always(target) => f.debug_tuple("Always").field(target).finish(),
            Edge::Conditional { routes, .. } => f
                .debug_struct("Conditional")
                .field("routes", routes)
                .finish(),
        }
    }
}

/// A directed state graph.
#[derive(Debug, Clone)]
pub struct Graph {
    entry: NodeId,
    edges: HashMap<NodeId, Edge>,
}

impl Graph {
    /// Start a graph whose first node is `entry`.
    pub fn new(entry: NodeId) -> Self {
        Self {
            entry,
            edges: HashMap::new(),
        }
    }

    /// Add an unconditional edge.
    pub fn edge(mut self, from: NodeId, to: Target) -> Self {
        self.edges.insert(from, Edge::Always(to));
        self
    }

    /// Add a conditional edge.
    pub fn conditional(
        mut self,
        from: NodeId,
        router: Router,
        routes: impl IntoIterator<Item = (RouteLabel, Target)>,
    ) -> Self {
        self.edges.insert(
            from,
            Edge::Conditional {
                router,
                routes: routes.into_iter().collect(),
            },
        );
        self
    }

    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn edges(&self) -> &HashMap<NodeId, Edge> {
        &self.edges
    }

    /// The full pipeline topology.
    pub fn pipeline() -> Self {
        use NodeId::*;
        use RouteLabel::*;

        Graph::new(RequirementsManager)
            .edge(RequirementsManager, Target::Node(Developer))
            .edge(Developer, Target::Node(QualityGate))
            .conditional(
                QualityGate,
                route_quality,
                [
                    (Passed, Target::Node(TestAgent)),
                    (Retry, Target::Node(Developer)),
                    (Exhausted, Target::End(Terminal::QualityLimitExceeded)),
                ],
            )
            .conditional(
                TestAgent,
                route_tests,
                [
                    (Passed, Target::Node(Reviewer)),
                    (Retry, Target::Node(Developer)),
                    (Exhausted, Target::End(Terminal::DebugLimitExceeded)),
                ],
            )
            .conditional(
                Reviewer,
                route_review,
                [
                    (Passed, Target::Node(Merge)),
                    (Retry, Target::Node(Developer)),
                    (Exhausted, Target::End(Terminal::ReviewLimitExceeded)),
                ],
            )
            .conditional(
                Merge,
                route_merge,
                [
                    (Passed, Target::Node(Stakeholder)),
                    (Failed, Target::End(Terminal::MergeFailed)),
                ],
            )
            .conditional(
                Stakeholder,
                route_stakeholder,
                [
                    (Passed, Target::End(Terminal::Success)),
                    (Retry, Target::Node(RequirementsManager)),
                    (Exhausted, Target::End(Terminal::FinalFailure)),
                ],
            )
    }

    /// Check that every node reachable through an edge is registered and has an outgoing edge.
    pub fn validate(&self, registry: &NodeRegistry) -> CoreResult<()> {
        let mut referenced = vec![self.entry];
        for (from, edge) in &self.edges {
            referenced.push(*from);
            match edge {
                Edge::Always(target) => referenced.extend(target_node(target)),
                Edge::Conditional { routes, .. } => {
                    if routes.is_empty() {
                        return Err(CoreError::InvalidGraph(format!(
                            "Conditional edge from {} has no routes",
                            from
                        )));
                    }
                    referenced.extend(routes.values().filter_map(target_node));
                }
            }
        }

        for id in referenced {
            if !registry.contains(id) {
                return Err(CoreError::InvalidGraph(format!(
                    "Node {} is referenced but not registered",
                    id
                )));
            }
            if !self.edges.contains_key(&id) {
                return Err(CoreError::InvalidGraph(format!(
                    "Node {} has no outgoing edge",
                    id
                )));
            }
        }
        Ok(())
    }

    /// Resolve the outgoing edge of `from` against the current state.
    pub fn next(&self, from: NodeId, state: &WorkflowState) -> CoreResult<(Option<RouteLabel>, Target)> {
        let edge = self
            .edges
            .get(&from)
            .ok_or_else(|| CoreError::InvalidGraph(format!("Node {} has no outgoing edge", from)))?;

        match edge {
            Edge::Always(target) => Ok((None, *target)),
            Edge::Conditional { router, routes } => {
                let label = router(state);
                let target = routes.get(&label).copied().ok_or_else(|| {
                    CoreError::InvalidGraph(format!(
                        "Router for {} returned unmapped label '{}'",
                        from, label
                    ))
                })?;
                Ok((Some(label), target))
            }
        }
    }
}

fn target_node(target: &Target) -> Option<NodeId> {
    match target {
        Target::Node(id) => Some(*id),
        Target::End(_) => None,
    }
}

/// Quality gate: admit, loop back to the developer, or stop at the quality bound.
pub fn route_quality(state: &WorkflowState) -> RouteLabel {
    if state.quality_passed {
        RouteLabel::Passed
    } else if state.counters.quality.exhausted() {
        RouteLabel::Exhausted
    } else {
        RouteLabel::Retry
    }
}

/// Test agent: admit, loop back to the developer, or stop at the debug bound.
///
/// `test_regeneration_needed` means the tests themselves stayed broken after
/// every regeneration. It stops at `DebugLimitExceeded` instead of returning
/// to the developer: the code is not at fault and no counter was charged, so
/// that loop would have no bound.
pub fn route_tests(state: &WorkflowState) -> RouteLabel {
    if state.tests_passed {
        RouteLabel::Passed
    } else if state.test_regeneration_needed || state.counters.debug.exhausted() {
        RouteLabel::Exhausted
    } else {
        RouteLabel::Retry
    }
}

/// Reviewer: admit, loop back to the developer, or stop at the review bound.
pub fn route_review(state: &WorkflowState) -> RouteLabel {
    if state.code_reviewed {
        RouteLabel::Passed
    } else if state.counters.review.exhausted() {
        RouteLabel::Exhausted
    } else {
        RouteLabel::Retry
    }
}

pub fn route_merge(state: &WorkflowState) -> RouteLabel {
    if state.pr_merged {
        RouteLabel::Passed
    } else {
        RouteLabel::Failed
    }
}

/// Stakeholder: finish, start a new requirements iteration, or stop at the outer bound.
pub fn route_stakeholder(state: &WorkflowState) -> RouteLabel {
    if state.validated {
        RouteLabel::Passed
    } else if state.counters.attempt.exhausted() {
        RouteLabel::Exhausted
    } else {
        RouteLabel::Retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryBudgets;

    fn state() -> WorkflowState {
        WorkflowState::new("p", &RetryBudgets::default())
    }

    #[test]
    fn test_quality_router() {
        let mut s = state();
        s.quality_passed = true;
        assert_eq!(route_quality(&s), RouteLabel::Passed);

        s.quality_passed = false;
        s.counters.quality.set(1);
        assert_eq!(route_quality(&s), RouteLabel::Retry);

        s.counters.quality.set(2);
        assert_eq!(route_quality(&s), RouteLabel::Exhausted);
    }

    #[test]
    fn test_tests_router_regeneration_is_terminal() {
        let mut s = state();
        s.test_regeneration_needed = true;
        assert_eq!(route_tests(&s), RouteLabel::Exhausted);

        s.test_regeneration_needed = false;
        assert_eq!(route_tests(&s), RouteLabel::Retry);

        s.tests_passed = true;
        assert_eq!(route_tests(&s), RouteLabel::Passed);
    }

    #[test]
    fn test_zero_debug_budget_is_exhausted() {
        let budgets = RetryBudgets {
            max_debug_attempts: 0,
            ..Default::default()
        };
        let s = WorkflowState::new("p", &budgets);
        assert_eq!(route_tests(&s), RouteLabel::Exhausted);
    }

    #[test]
    fn test_stakeholder_router() {
        let mut s = state();
        s.counters.attempt.set(1);
        assert_eq!(route_stakeholder(&s), RouteLabel::Exhausted);

        s.counters.attempt.max = 2;
        assert_eq!(route_stakeholder(&s), RouteLabel::Retry);

        s.validated = true;
        assert_eq!(route_stakeholder(&s), RouteLabel::Passed);
    }

    #[test]
    fn test_pipeline_next() {
        let graph = Graph::pipeline();
        let mut s = state();

        let (label, target) = graph.next(NodeId::RequirementsManager, &s).unwrap();
        assert!(label.is_none());
        assert_eq!(target, Target::Node(NodeId::Developer));

        s.pr_merged = false;
        let (label, target) = graph.next(NodeId::Merge, &s).unwrap();
        assert_eq!(label, Some(RouteLabel::Failed));
        assert_eq!(target, Target::End(Terminal::MergeFailed));
    }

    #[test]
    fn test_validate_reports_missing_nodes() {
        let graph = Graph::pipeline();
        let registry = NodeRegistry::new();
        assert!(matches!(
            graph.validate(&registry),
            Err(CoreError::InvalidGraph(_))
        ));
    }
}
