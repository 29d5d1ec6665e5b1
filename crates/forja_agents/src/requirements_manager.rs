//! Requirements manager: prompt and feedback into a formal-requirements record.

use std::sync::Arc;

use async_trait::async_trait;
use forja_core::{
    names, strip_code_fences, CoreResult, FormalRequirements, Node, NodeId, StateDelta,
    TrackerRef, WorkflowState, PARSE_ERROR_MARKER,
};
use forja_llm::{formal_requirements_schema, is_error_sentinel, schema, LlmRequest, Role};
use tracing::{info, warn};

use crate::error::AgentResult;
use crate::services::AgentServices;
use crate::tracking::{estimate_story_points, find_or_create_pbi};

/// Context line used when there is no stakeholder feedback yet.
const NO_FEEDBACK: &str = "Ninguno - Primera iteración";

pub struct RequirementsManager {
    services: Arc<AgentServices>,
}

impl RequirementsManager {
    pub fn new(services: Arc<AgentServices>) -> Self {
        Self { services }
    }

    fn context(state: &WorkflowState) -> String {
        let feedback = if state.has_feedback() {
            state.stakeholder_feedback.trim()
        } else {
            NO_FEEDBACK
        };
        format!(
            "Petición inicial del usuario:\n{}\n\nFeedback del stakeholder:\n{}",
            state.initial_prompt.trim(),
            feedback
        )
    }

    async fn execute(&self, state: &WorkflowState) -> AgentResult<StateDelta> {
        let iteration = state.counters.attempt.next();
        info!(
            "Requirements iteration {}/{}{}",
            iteration,
            state.counters.attempt.max,
            if state.has_feedback() { " (with stakeholder feedback)" } else { "" }
        );

        let request = LlmRequest::new(Role::RequirementsManager, Self::context(state))
            .with_schema(formal_requirements_schema());
        let raw = self.services.ask(request).await?;

        let mut delta = StateDelta {
            stakeholder_feedback: Some(String::new()),
            attempt_count: Some(iteration),
            debug_attempt_count: Some(0),
            quality_attempt_count: Some(0),
            ..Default::default()
        };

        match parse_requirements(&raw) {
            Ok(record) => {
                let mut record = record.with_traceability_defaults();
                if state.pbi_id.is_none() {
                    if let Some(tracker_ref) = self.ensure_pbi(&record).await {
                        delta.pbi_id = Some(Some(tracker_ref.id));
                        record.azure_devops = Some(tracker_ref);
                    }
                }
                info!(
                    "Formal requirements: {} ({}, {} test cases)",
                    record.nombre_funcion,
                    record.lenguaje_version,
                    record.casos_de_prueba.len()
                );
                delta.clarified_requirement = Some(record.objetivo_funcional.clone());
                delta.formal_requirements = Some(record.to_json()?);
            }
            Err(reason) => {
                warn!("Could not parse formal requirements: {}", reason);
                delta.clarified_requirement = Some(state.initial_prompt.clone());
                delta.formal_requirements = Some(format!("{} {}", PARSE_ERROR_MARKER, reason));
            }
        }

        if let Some(text) = &delta.formal_requirements {
            self.services.save(&names::requirements(iteration), text);
        }
        Ok(delta)
    }

    async fn ensure_pbi(&self, record: &FormalRequirements) -> Option<TrackerRef> {
        let story_points = estimate_story_points(record);
        let pbi = find_or_create_pbi(
            self.services.collaborators.tracker.as_ref(),
            record,
            story_points,
        )
        .await?;
        Some(TrackerRef {
            id: pbi.id,
            url: pbi.url,
            story_points,
        })
    }
}

#[async_trait]
impl Node for RequirementsManager {
    fn id(&self) -> NodeId {
        NodeId::RequirementsManager
    }

    fn description(&self) -> &str {
        "Turns the prompt and stakeholder feedback into formal requirements"
    }

    async fn run(&self, state: &WorkflowState) -> CoreResult<StateDelta> {
        self.execute(state).await.map_err(|e| e.into_core(self.id()))
    }
}

/// Parse the model answer into a record.
///
/// The strict path validates against the JSON schema. The permissive path
/// takes the outermost `{...}` object of the fence-stripped text.
pub fn parse_requirements(raw: &str) -> Result<FormalRequirements, String> {
    if is_error_sentinel(raw) {
        return Err(raw.trim().to_string());
    }
    let text = strip_code_fences(raw);

    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => match schema::validate(&formal_requirements_schema(), &value) {
            Ok(()) => match FormalRequirements::from_json(&text) {
                Ok(record) => return Ok(record),
                Err(e) => warn!("Schema-valid requirements rejected: {}", e),
            },
            Err(errors) => warn!("Requirements do not match the schema: {}", errors.join("; ")),
        },
        Err(e) => warn!("Requirements are not valid JSON: {}", e),
    }

    let (start, end) = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => return Err("no JSON object found in the model output".to_string()),
    };
    FormalRequirements::from_json(&text[start..=end]).map_err(|e| e.to_string())
}
