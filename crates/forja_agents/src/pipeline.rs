//! The assembled multi-agent pipeline.

use std::sync::Arc;

use forja_core::requirements::base_name_or_default;
use forja_core::{
    strip_code_fences, ExecutionLog, Graph, GraphExecutor, NodeRegistry, StepEvent, WorkflowState,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::developer::Developer;
use crate::error::AgentResult;
use crate::merge::Merge;
use crate::quality_gate::QualityGate;
use crate::requirements_manager::RequirementsManager;
use crate::reviewer::Reviewer;
use crate::services::AgentServices;
use crate::stakeholder::Stakeholder;
use crate::test_agent::TestAgent;

/// Registry with the seven pipeline nodes sharing `services`.
pub fn build_registry(services: &Arc<AgentServices>) -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(RequirementsManager::new(Arc::clone(services))));
    registry.register(Arc::new(Developer::new(Arc::clone(services))));
    registry.register(Arc::new(QualityGate::new(Arc::clone(services))));
    registry.register(Arc::new(TestAgent::new(Arc::clone(services))));
    registry.register(Arc::new(Reviewer::new(Arc::clone(services))));
    registry.register(Arc::new(Merge::new(Arc::clone(services))));
    registry.register(Arc::new(Stakeholder::new(Arc::clone(services))));
    registry
}

pub struct Pipeline {
    services: Arc<AgentServices>,
    registry: Arc<NodeRegistry>,
    graph: Arc<Graph>,
}

impl Pipeline {
    pub fn new(services: Arc<AgentServices>) -> Self {
        let registry = Arc::new(build_registry(&services));
        Self {
            services,
            registry,
            graph: Arc::new(Graph::pipeline()),
        }
    }

    pub fn services(&self) -> &AgentServices {
        &self.services
    }

    /// Run the pipeline on a user prompt.
    ///
    /// The artifact directory is reset first. On success the final code is
    /// written next to the artifacts as `<base>.<ext>`.
    pub async fn run(
        &self,
        prompt: &str,
        events: Option<UnboundedSender<StepEvent>>,
    ) -> AgentResult<ExecutionLog> {
        let removed = self.services.artifacts.reset()?;
        info!(
            "Artifact directory {} ready ({} stale entries removed)",
            self.services.artifacts.root().display(),
            removed
        );

        let mut executor = GraphExecutor::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.graph),
            self.services.artifacts.logs_dir(),
        );
        if let Some(sender) = events {
            executor = executor.with_events(sender);
        }

        let state = WorkflowState::new(prompt, &self.services.settings.budgets);
        let log = executor.run(state).await?;

        if log.succeeded() {
            let state = &log.state;
            let base_name = base_name_or_default(&state.formal_requirements);
            match self.services.artifacts.save_final_code(
                &base_name,
                state.language(),
                &strip_code_fences(&state.generated_code),
            ) {
                Ok(path) => info!("Final code saved to {}", path.display()),
                Err(e) => warn!("Could not save the final code: {}", e),
            }
        }
        Ok(log)
    }
}
