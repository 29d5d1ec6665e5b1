//! Stakeholder: business validation of the merged code.
//!
//! A validated delivery closes its work items and gets a release note.
//! A rejection carries the `Motivo:` line back to the requirements manager.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use forja_clients::states;
use forja_core::requirements::base_name_or_default;
use forja_core::{names, strip_code_fences, CoreResult, Node, NodeId, StateDelta, WorkflowState};
use forja_llm::{LlmRequest, Role};
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::AgentResult;
use crate::services::{soft, AgentServices};

fn verdict_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)VALIDACI[OÓ]N\s+FINAL:\s*(VALIDADO|RECHAZADO)").ok())
        .as_ref()
}

/// Outcome of the stakeholder answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub validated: bool,
    /// Rejection reason; empty when validated.
    pub feedback: String,
}

/// Read the verdict line. Anything without an explicit `VALIDADO` is a rejection.
pub fn parse_validation(answer: &str) -> Validation {
    let validated = verdict_regex()
        .and_then(|re| re.captures(answer))
        .and_then(|caps| caps.get(1))
        .is_some_and(|m| m.as_str().eq_ignore_ascii_case("VALIDADO"));
    if validated {
        return Validation {
            validated,
            feedback: String::new(),
        };
    }

    let feedback = answer
        .lines()
        .find_map(|line| {
            let line = line.trim();
            line.strip_prefix("Motivo:")
                .or_else(|| line.strip_prefix("MOTIVO:"))
                .map(|reason| reason.trim().to_string())
        })
        .filter(|reason| !reason.is_empty())
        .unwrap_or_else(|| answer.trim().to_string());
    Validation {
        validated: false,
        feedback,
    }
}

pub struct Stakeholder {
    services: Arc<AgentServices>,
}

impl Stakeholder {
    pub fn new(services: Arc<AgentServices>) -> Self {
        Self { services }
    }

    fn context(state: &WorkflowState) -> String {
        format!(
            "Requisitos formales:\n{}\n\nCódigo entregado:\n```{}\n{}\n```\n\nResultado de las pruebas: {}",
            state.formal_requirements.trim(),
            state.language().fence_tag(),
            strip_code_fences(&state.generated_code),
            if state.test_summary.trim().is_empty() {
                "sin datos"
            } else {
                state.test_summary.trim()
            }
        )
    }

    async fn execute(&self, state: &WorkflowState) -> AgentResult<StateDelta> {
        let iteration = state.iteration();
        let answer = self
            .services
            .ask(LlmRequest::new(Role::Stakeholder, Self::context(state)))
            .await?;
        let validation = parse_validation(&answer);
        self.services
            .save(&names::stakeholder(iteration, validation.validated), answer.trim());

        if !validation.validated {
            info!(
                "Stakeholder rejected iteration {}/{}: {}",
                iteration, state.counters.attempt.max, validation.feedback
            );
            return Ok(StateDelta {
                validated: Some(false),
                stakeholder_feedback: Some(validation.feedback),
                ..Default::default()
            });
        }

        info!("Stakeholder validated iteration {}", iteration);
        self.close_work_items(state).await;
        self.release_note(state).await?;
        Ok(StateDelta {
            validated: Some(true),
            stakeholder_feedback: Some(String::new()),
            ..Default::default()
        })
    }

    /// Attach the code to the PBI, then close the tasks and the PBI in that order.
    async fn close_work_items(&self, state: &WorkflowState) {
        let tracker = &self.services.collaborators.tracker;

        if let Some(pbi) = state.pbi_id {
            let code_file = state
                .language()
                .source_file_name(&base_name_or_default(&state.formal_requirements));
            let path = self.services.artifacts.path(&code_file);
            if path.exists() {
                soft(
                    "attach final code",
                    tracker.attach_file(pbi, &path, "Código final validado por el stakeholder"),
                )
                .await;
            }
        }

        let items = [
            (state.implementation_task_id, "✅ Implementación completada y validada."),
            (state.testing_task_id, "✅ Tests unitarios completados y validados."),
            (state.pbi_id, "✅ Funcionalidad validada por el stakeholder."),
        ];
        for (id, comment) in items {
            if let Some(id) = id {
                if soft("close work item", tracker.set_state(id, states::DONE, Some(comment)))
                    .await
                    .is_some()
                {
                    info!("Work item #{} moved to {}", id, states::DONE);
                }
            }
        }
    }

    async fn release_note(&self, state: &WorkflowState) -> AgentResult<()> {
        let context = format!(
            "Requisitos formales:\n{}\n\nPruebas: {}\nPuntuación de revisión: {}\nPR: {}",
            state.formal_requirements.trim(),
            state.test_summary.trim(),
            state.review_score.map_or("-".to_string(), |s| format!("{}/10", s)),
            state.pr_url.as_deref().unwrap_or("-")
        );
        let note = self
            .services
            .ask(LlmRequest::new(Role::ReleaseNote, context))
            .await?;
        let note = strip_code_fences(&note);

        let written = match state.pbi_id {
            Some(pbi) => {
                let field = self.services.settings.tracker.release_note_field.as_str();
                soft(
                    "write release note",
                    self.services.collaborators.tracker.update_work_item(
                        pbi,
                        &[(field, Value::String(note.clone()))],
                        None,
                    ),
                )
                .await
                .is_some()
            }
            None => false,
        };

        if !written {
            warn!("Release note kept as a local artifact");
            self.services
                .save(&names::release_note(state.iteration()), &note);
        }
        Ok(())
    }
}

#[async_trait]
impl Node for Stakeholder {
    fn id(&self) -> NodeId {
        NodeId::Stakeholder
    }

    fn description(&self) -> &str {
        "Validates the delivery against the business intent"
    }

    async fn run(&self, state: &WorkflowState) -> CoreResult<StateDelta> {
        self.execute(state).await.map_err(|e| e.into_core(self.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{services, tested_state};
    use forja_llm::ScriptedLlm;
    use tempfile::TempDir;

    #[test]
    fn test_parse_validation() {
        assert!(parse_validation("VALIDACIÓN FINAL: VALIDADO").validated);
        assert!(parse_validation("validacion final:   validado\nTodo correcto").validated);

        let rejected = parse_validation("VALIDACIÓN FINAL: RECHAZADO\nMotivo: debe aceptar n argumentos");
        assert!(!rejected.validated);
        assert_eq!(rejected.feedback, "debe aceptar n argumentos");

        let no_reason = parse_validation("VALIDACIÓN FINAL: RECHAZADO, falta el redondeo");
        assert_eq!(no_reason.feedback, "VALIDACIÓN FINAL: RECHAZADO, falta el redondeo");

        assert!(!parse_validation("Me parece bien").validated);
    }

    #[tokio::test]
    async fn test_validation_writes_release_note_fallback() {
        let temp = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLlm::new());
        let node = Stakeholder::new(services(&temp, Arc::clone(&llm), None));

        let delta = node.run(&tested_state()).await.unwrap();
        assert_eq!(delta.validated, Some(true));
        assert!(temp.path().join("7_stakeholder_intento_1_VALIDADO.txt").exists());
        assert!(temp.path().join("release_note_req1.md").exists());
        assert_eq!(llm.call_count(Role::ReleaseNote), 1);
    }

    #[tokio::test]
    async fn test_rejection_sets_feedback() {
        let temp = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLlm::new());
        llm.push(
            Role::Stakeholder,
            "VALIDACIÓN FINAL: RECHAZADO\nMotivo: el resultado debe redondearse a dos decimales",
        );
        let node = Stakeholder::new(services(&temp, Arc::clone(&llm), None));

        let delta = node.run(&tested_state()).await.unwrap();
        assert_eq!(delta.validated, Some(false));
        assert_eq!(
            delta.stakeholder_feedback.as_deref(),
            Some("el resultado debe redondearse a dos decimales")
        );
        assert!(temp.path().join("7_stakeholder_intento_1_RECHAZADO.txt").exists());
        assert_eq!(llm.call_count(Role::ReleaseNote), 0);
    }
}
