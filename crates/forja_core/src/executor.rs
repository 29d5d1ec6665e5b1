//! Graph executor with persistence and progress events.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::graph::{Graph, RouteLabel, Target, Terminal};
use crate::node::NodeId;
use crate::registry::NodeRegistry;
use crate::state::{RetryCounters, WorkflowState};

/// Run status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    /// Reached a terminal edge (successful or not).
    Completed,
    /// A node returned an error or the visit guard tripped.
    Failed,
}

/// One node visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitRecord {
    pub step: usize,
    pub node: NodeId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub changed_fields: Vec<String>,
    pub route: Option<RouteLabel>,
}

/// Persistent record of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub visits: Vec<VisitRecord>,
    pub terminal: Option<Terminal>,
    pub visit_limit: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// State snapshot after the last applied delta.
    pub state: WorkflowState,
    /// Directory the log is written to.
    pub log_dir: PathBuf,
}

impl ExecutionLog {
    pub fn new(log_dir: impl Into<PathBuf>, state: WorkflowState) -> Self {
        let visit_limit = visit_limit(&state.counters);
        Self {
            run_id: Uuid::new_v4(),
            status: RunStatus::Pending,
            visits: Vec::new(),
            terminal: None,
            visit_limit,
            started_at: None,
            completed_at: None,
            error: None,
            state,
            log_dir: log_dir.into(),
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(format!("run_{}.json", self.run_id))
    }

    /// Save the log to disk.
    pub fn save(&self) -> CoreResult<()> {
        let path = self.log_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        debug!("Saved execution log to {:?}", path);
        Ok(())
    }

    /// Load a log from disk.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// How many times `node` was visited.
    pub fn visits_of(&self, node: NodeId) -> usize {
        self.visits.iter().filter(|v| v.node == node).count()
    }

    pub fn succeeded(&self) -> bool {
        self.terminal.map_or(false, |t| t.is_success())
    }

    fn fail(&mut self, message: String) {
        error!("{}", message);
        self.status = RunStatus::Failed;
        self.error = Some(message);
        self.completed_at = Some(Utc::now());
    }
}

/// Upper bound on node visits for a run with the given counter bounds.
///
/// One requirements iteration visits at most: the requirements node, then for
/// every review cycle and every debug cycle up to `(quality + 1)` developer
/// and quality-gate pairs plus one test visit, one reviewer visit per review
/// cycle, and the merge and stakeholder nodes.
pub fn visit_limit(counters: &RetryCounters) -> usize {
    let q = counters.quality.max as usize + 1;
    let d = counters.debug.max as usize + 1;
    let r = counters.review.max as usize + 1;
    let per_attempt = r * d * q * 4 + 3;
    per_attempt * (counters.attempt.max as usize).max(1)
}

/// Progress notifications emitted while a run advances.
#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    NodeStarted {
        step: usize,
        node: NodeId,
    },
    NodeFinished {
        step: usize,
        node: NodeId,
        changed_fields: Vec<String>,
        next: Target,
    },
    Finished {
        terminal: Terminal,
    },
    Failed {
        node: Option<NodeId>,
        message: String,
    },
}

/// Runs a [`Graph`] one node at a time.
pub struct GraphExecutor {
    registry: Arc<NodeRegistry>,
    graph: Arc<Graph>,
    log_dir: PathBuf,
    events: Option<UnboundedSender<StepEvent>>,
}

impl GraphExecutor {
    pub fn new(registry: Arc<NodeRegistry>, graph: Arc<Graph>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            graph,
            log_dir: log_dir.into(),
            events: None,
        }
    }

    /// Stream step events to `sender`.
    pub fn with_events(mut self, sender: UnboundedSender<StepEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    fn emit(&self, event: StepEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(event);
        }
    }

    /// Run the graph from its entry node until a terminal edge.
    ///
    /// The execution log is persisted after each node. A node error or a
    /// tripped visit guard marks the log failed and is returned as an error.
    pub async fn run(&self, initial: WorkflowState) -> CoreResult<ExecutionLog> {
        self.graph.validate(&self.registry)?;

        let mut log = ExecutionLog::new(&self.log_dir, initial);
        log.status = RunStatus::Running;
        log.started_at = Some(Utc::now());
        info!(
            "Starting run {} (visit limit {})",
            log.run_id, log.visit_limit
        );

        let mut current = self.graph.entry();
        loop {
            let step = log.visits.len() + 1;
            if step > log.visit_limit {
                let err = CoreError::VisitLimitExceeded {
                    visits: log.visits.len(),
                    limit: log.visit_limit,
                };
                log.fail(err.to_string());
                log.save()?;
                self.emit(StepEvent::Failed {
                    node: Some(current),
                    message: err.to_string(),
                });
                return Err(err);
            }

            let node = self.registry.get_required(current)?;
            info!("Executing node [{}/{}]: {}", step, log.visit_limit, current);
            self.emit(StepEvent::NodeStarted { step, node: current });

            let started_at = Utc::now();
            let delta = match node.run(&log.state).await {
                Ok(delta) => delta,
                Err(e) => {
                    log.fail(format!("Node '{}' execution error: {}", current, e));
                    log.save()?;
                    self.emit(StepEvent::Failed {
                        node: Some(current),
                        message: e.to_string(),
                    });
                    return Err(CoreError::NodeExecutionFailed {
                        node: current.display_name().to_string(),
                        message: e.to_string(),
                    });
                }
            };

            let changed: Vec<String> = delta
                .apply(&mut log.state)
                .into_iter()
                .map(str::to_string)
                .collect();
            debug!("{} changed: {}", current, changed.join(", "));

            let (route, target) = match self.graph.next(current, &log.state) {
                Ok(next) => next,
                Err(e) => {
                    log.fail(e.to_string());
                    log.save()?;
                    return Err(e);
                }
            };

            log.visits.push(VisitRecord {
                step,
                node: current,
                started_at,
                finished_at: Utc::now(),
                changed_fields: changed.clone(),
                route,
            });
            log.save()?;

            self.emit(StepEvent::NodeFinished {
                step,
                node: current,
                changed_fields: changed,
                next: target,
            });

            match target {
                Target::Node(next) => {
                    if let Some(label) = route {
                        info!("{} routed '{}' -> {}", current, label, next);
                    }
                    current = next;
                }
                Target::End(terminal) => {
                    log.terminal = Some(terminal);
                    log.status = RunStatus::Completed;
                    log.completed_at = Some(Utc::now());
                    log.save()?;
                    info!(
                        "Run {} finished after {} visits: {}",
                        log.run_id,
                        log.visits.len(),
                        terminal
                    );
                    self.emit(StepEvent::Finished { terminal });
                    return Ok(log);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryBudgets;
    use crate::delta::StateDelta;
    use crate::graph::{route_quality, RouteLabel};
    use crate::node::Node;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Applies a fixed delta on every visit.
    struct FixedNode {
        id: NodeId,
        delta: fn(&WorkflowState) -> StateDelta,
    }

    #[async_trait]
    impl Node for FixedNode {
        fn id(&self) -> NodeId {
            self.id
        }

        fn description(&self) -> &str {
            "Fixed test node"
        }

        async fn run(&self, state: &WorkflowState) -> CoreResult<StateDelta> {
            Ok((self.delta)(state))
        }
    }

    struct FailingNode;

    #[async_trait]
    impl Node for FailingNode {
        fn id(&self) -> NodeId {
            NodeId::Developer
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        async fn run(&self, _state: &WorkflowState) -> CoreResult<StateDelta> {
            Err(CoreError::InvalidState("Intentional failure".to_string()))
        }
    }

    fn quality_loop_graph() -> Graph {
        Graph::new(NodeId::Developer)
            .edge(NodeId::Developer, Target::Node(NodeId::QualityGate))
            .conditional(
                NodeId::QualityGate,
                route_quality,
                [
                    (RouteLabel::Passed, Target::End(Terminal::Success)),
                    (RouteLabel::Retry, Target::Node(NodeId::Developer)),
                    (
                        RouteLabel::Exhausted,
                        Target::End(Terminal::QualityLimitExceeded),
                    ),
                ],
            )
    }

    fn registry_with(gate: fn(&WorkflowState) -> StateDelta) -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(FixedNode {
            id: NodeId::Developer,
            delta: |_| StateDelta {
                generated_code: Some("code".to_string()),
                ..Default::default()
            },
        }));
        registry.register(Arc::new(FixedNode {
            id: NodeId::QualityGate,
            delta: gate,
        }));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_run_reaches_success() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry_with(|_| StateDelta {
            quality_passed: Some(true),
            ..Default::default()
        });
        let executor = GraphExecutor::new(registry, Arc::new(quality_loop_graph()), temp_dir.path());

        let log = executor
            .run(WorkflowState::new("p", &RetryBudgets::default()))
            .await
            .unwrap();

        assert_eq!(log.status, RunStatus::Completed);
        assert_eq!(log.terminal, Some(Terminal::Success));
        assert_eq!(log.visits.len(), 2);
        assert_eq!(log.state.generated_code, "code");
        assert!(log.succeeded());
    }

    #[tokio::test]
    async fn test_run_stops_at_counter_bound() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry_with(|state| StateDelta {
            quality_passed: Some(false),
            quality_attempt_count: Some(state.counters.quality.next()),
            ..Default::default()
        });
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let executor = GraphExecutor::new(registry, Arc::new(quality_loop_graph()), temp_dir.path())
            .with_events(tx);

        let log = executor
            .run(WorkflowState::new("p", &RetryBudgets::default()))
            .await
            .unwrap();

        assert_eq!(log.terminal, Some(Terminal::QualityLimitExceeded));
        assert_eq!(log.visits_of(NodeId::QualityGate), 2);
        assert_eq!(log.state.counters.quality.count, 2);

        let mut finished = None;
        while let Ok(event) = rx.try_recv() {
            if let StepEvent::Finished { terminal } = event {
                finished = Some(terminal);
            }
        }
        assert_eq!(finished, Some(Terminal::QualityLimitExceeded));
    }

    #[tokio::test]
    async fn test_visit_guard_trips_on_uncharged_loop() {
        let temp_dir = TempDir::new().unwrap();
        // Rejects without charging the counter: only the guard can stop it.
        let registry = registry_with(|_| StateDelta {
            quality_passed: Some(false),
            ..Default::default()
        });
        let executor = GraphExecutor::new(registry, Arc::new(quality_loop_graph()), temp_dir.path());

        let state = WorkflowState::new("p", &RetryBudgets::default());
        let limit = visit_limit(&state.counters);
        let err = executor.run(state).await.unwrap_err();

        assert!(matches!(err, CoreError::VisitLimitExceeded { limit: l, .. } if l == limit));
    }

    #[tokio::test]
    async fn test_node_error_is_persisted() {
        let temp_dir = TempDir::new().unwrap();
        let mut registry = NodeRegistry::new();
        registry.register(Arc::new(FailingNode));
        registry.register(Arc::new(FixedNode {
            id: NodeId::QualityGate,
            delta: |_| StateDelta::default(),
        }));
        let executor = GraphExecutor::new(
            Arc::new(registry),
            Arc::new(quality_loop_graph()),
            temp_dir.path(),
        );

        let result = executor
            .run(WorkflowState::new("p", &RetryBudgets::default()))
            .await;
        assert!(matches!(result, Err(CoreError::NodeExecutionFailed { .. })));

        let entry = fs::read_dir(temp_dir.path()).unwrap().next().unwrap().unwrap();
        let log = ExecutionLog::load(&entry.path()).unwrap();
        assert_eq!(log.status, RunStatus::Failed);
        assert!(log.error.unwrap().contains("Intentional failure"));
    }

    #[test]
    fn test_visit_limit_scales_with_attempts() {
        let budgets = RetryBudgets::default();
        let one = visit_limit(&RetryCounters::from_budgets(&budgets));
        let two = visit_limit(&RetryCounters::from_budgets(&RetryBudgets {
            max_attempts: 2,
            ..budgets
        }));
        assert_eq!(two, one * 2);
    }
}
