//! Reviewer: LLM code review of the tested code before it is merged.

use std::sync::Arc;

use async_trait::async_trait;
use forja_clients::ReviewEvent;
use forja_core::{names, strip_code_fences, CoreResult, Node, NodeId, StateDelta, WorkflowState};
use forja_llm::{is_error_sentinel, LlmRequest, Role};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::AgentResult;
use crate::services::{soft, AgentServices};

/// Score given when the model answer cannot be read.
pub const FALLBACK_SCORE: u8 = 7;

/// Structured review verdict.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReviewVerdict {
    #[serde(alias = "approved")]
    pub aprobado: bool,
    #[serde(alias = "score", default, deserialize_with = "de_score")]
    pub puntuacion: u8,
    #[serde(alias = "positives", alias = "strengths", default)]
    pub aspectos_positivos: Vec<String>,
    #[serde(alias = "improvements", alias = "issues", default)]
    pub aspectos_mejorar: Vec<String>,
    #[serde(alias = "comment", alias = "comentario", default)]
    pub comentario_revision: String,
}

fn de_score<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = f64::deserialize(deserializer)?;
    Ok(value.round().clamp(0.0, 10.0) as u8)
}

impl ReviewVerdict {
    /// Verdict used when the answer is unreadable.
    pub fn fallback(raw: &str) -> Self {
        Self {
            aprobado: true,
            puntuacion: FALLBACK_SCORE,
            aspectos_positivos: Vec::new(),
            aspectos_mejorar: Vec::new(),
            comentario_revision: raw.trim().to_string(),
        }
    }

    /// Rejection recorded when the gateway answered with an error sentinel.
    pub fn unavailable(sentinel: &str) -> Self {
        Self {
            aprobado: false,
            puntuacion: 0,
            aspectos_positivos: Vec::new(),
            aspectos_mejorar: Vec::new(),
            comentario_revision: sentinel.trim().to_string(),
        }
    }

    /// Parse a verdict from plain, fenced or prefixed JSON.
    pub fn parse(raw: &str) -> Option<Self> {
        let text = strip_code_fences(raw);
        if let Ok(verdict) = serde_json::from_str(&text) {
            return Some(verdict);
        }
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        if start >= end {
            return None;
        }
        serde_json::from_str(&text[start..=end]).ok()
    }

    /// Comment handed to the developer on rejection.
    pub fn feedback(&self) -> String {
        let mut text = self.comentario_revision.trim().to_string();
        if !self.aspectos_mejorar.is_empty() {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str("Aspectos a mejorar:\n");
            text.push_str(&bullets(&self.aspectos_mejorar));
        }
        text
    }

    /// Markdown body of the pull-request review.
    pub fn to_markdown(&self) -> String {
        let mut body = format!(
            "## {} Revisión automática\n\n**Puntuación:** {}/10\n",
            if self.aprobado { "✅" } else { "❌" },
            self.puntuacion
        );
        if !self.comentario_revision.trim().is_empty() {
            body.push_str(&format!("\n{}\n", self.comentario_revision.trim()));
        }
        if !self.aspectos_positivos.is_empty() {
            body.push_str("\n### Aspectos positivos\n");
            body.push_str(&bullets(&self.aspectos_positivos));
        }
        if !self.aspectos_mejorar.is_empty() {
            body.push_str("\n### Aspectos a mejorar\n");
            body.push_str(&bullets(&self.aspectos_mejorar));
        }
        body
    }

    fn report(&self) -> String {
        format!(
            "Veredicto: {}\nPuntuación: {}/10\n\nComentario:\n{}\n\nAspectos positivos:\n{}\nAspectos a mejorar:\n{}",
            if self.aprobado { "APROBADO" } else { "RECHAZADO" },
            self.puntuacion,
            self.comentario_revision.trim(),
            bullets(&self.aspectos_positivos),
            bullets(&self.aspectos_mejorar)
        )
    }
}

fn bullets(items: &[String]) -> String {
    items.iter().map(|item| format!("- {}\n", item.trim())).collect()
}

pub struct Reviewer {
    services: Arc<AgentServices>,
}

impl Reviewer {
    pub fn new(services: Arc<AgentServices>) -> Self {
        Self { services }
    }

    fn context(state: &WorkflowState) -> String {
        let language = state.language();
        format!(
            "Requisitos formales:\n{}\n\nCódigo:\n```{tag}\n{}\n```\n\nTests unitarios ({}):\n```{tag}\n{}\n```",
            state.formal_requirements.trim(),
            strip_code_fences(&state.generated_code),
            state.test_summary.trim(),
            strip_code_fences(&state.generated_tests),
            tag = language.fence_tag(),
        )
    }

    async fn execute(&self, state: &WorkflowState) -> AgentResult<StateDelta> {
        let raw = self
            .services
            .ask(LlmRequest::new(Role::Reviewer, Self::context(state)))
            .await?;

        let verdict = if is_error_sentinel(&raw) {
            warn!("Review unavailable, rejecting: {}", raw.trim());
            ReviewVerdict::unavailable(&raw)
        } else {
            ReviewVerdict::parse(&raw).unwrap_or_else(|| {
                warn!("Unreadable review, approving with score {}", FALLBACK_SCORE);
                ReviewVerdict::fallback(&raw)
            })
        };
        info!(
            "Review {} with score {}/10",
            if verdict.aprobado { "approved" } else { "rejected" },
            verdict.puntuacion
        );
        self.services
            .save(&names::review(state.iteration()), &verdict.report());

        let delta = if verdict.aprobado {
            StateDelta {
                code_reviewed: Some(true),
                review_attempt_count: Some(0),
                review_comment: Some(verdict.comentario_revision.trim().to_string()),
                review_score: Some(Some(verdict.puntuacion)),
                ..Default::default()
            }
        } else {
            StateDelta {
                code_reviewed: Some(false),
                review_attempt_count: Some(state.counters.review.next()),
                review_comment: Some(verdict.feedback()),
                review_score: Some(Some(verdict.puntuacion)),
                ..Default::default()
            }
        };

        if let Some(pr) = state.pr_number {
            let event = if verdict.aprobado {
                ReviewEvent::Approve
            } else {
                ReviewEvent::Comment
            };
            let scm = &self.services.collaborators.scm;
            if let Some(recorded) = soft("post PR review", scm.create_review(pr, event, &verdict.to_markdown())).await {
                if recorded != event {
                    info!("PR #{} review recorded as {} instead of {}", pr, recorded, event);
                }
            }
        }

        Ok(delta)
    }
}

#[async_trait]
impl Node for Reviewer {
    fn id(&self) -> NodeId {
        NodeId::Reviewer
    }

    fn description(&self) -> &str {
        "Reviews the tested code and posts the verdict on the pull request"
    }

    async fn run(&self, state: &WorkflowState) -> CoreResult<StateDelta> {
        self.execute(state).await.map_err(|e| e.into_core(self.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{services, tested_state, MockScm};
    use forja_llm::ScriptedLlm;
    use mockall::predicate::eq;
    use tempfile::TempDir;

    const REJECTED: &str = r#"Mi revisión:
```json
{"approved": false, "score": 4.6, "improvements": ["Validar tipos"], "comment": "Falta validación"}
```"#;

    #[test]
    fn test_parse_aliases_and_fences() {
        let verdict = ReviewVerdict::parse(REJECTED).unwrap();
        assert!(!verdict.aprobado);
        assert_eq!(verdict.puntuacion, 5);
        assert_eq!(verdict.aspectos_mejorar, vec!["Validar tipos"]);
        assert!(verdict.feedback().contains("Falta validación\n\nAspectos a mejorar:\n- Validar tipos"));

        assert!(ReviewVerdict::parse("todo bien").is_none());
    }

    #[test]
    fn test_markdown_body() {
        let verdict = ReviewVerdict {
            aprobado: true,
            puntuacion: 9,
            aspectos_positivos: vec!["Claro".to_string()],
            aspectos_mejorar: Vec::new(),
            comentario_revision: "Bien".to_string(),
        };
        let body = verdict.to_markdown();
        assert!(body.contains("**Puntuación:** 9/10"));
        assert!(body.contains("### Aspectos positivos\n- Claro"));
        assert!(!body.contains("Aspectos a mejorar"));
    }

    #[tokio::test]
    async fn test_approval_posts_approving_review() {
        let temp = TempDir::new().unwrap();
        let mut scm = MockScm::new();
        scm.expect_create_review()
            .with(eq(7), eq(ReviewEvent::Approve), mockall::predicate::always())
            .times(1)
            .returning(|_, event, _| Ok(event));

        let llm = Arc::new(ScriptedLlm::new());
        let reviewer = Reviewer::new(services(&temp, llm, Some(scm)));
        let mut state = tested_state();
        state.pr_number = Some(7);
        state.counters.review.set(1);

        let delta = reviewer.run(&state).await.unwrap();
        assert_eq!(delta.code_reviewed, Some(true));
        assert_eq!(delta.review_attempt_count, Some(0));
        assert_eq!(delta.review_score, Some(Some(9)));
        assert!(temp.path().join("5_review_req1.txt").exists());
    }

    #[tokio::test]
    async fn test_rejection_charges_review_counter() {
        let temp = TempDir::new().unwrap();
        let mut scm = MockScm::new();
        scm.expect_create_review()
            .withf(|pr, event, body| *pr == 3 && *event == ReviewEvent::Comment && body.contains("Validar tipos"))
            .times(1)
            .returning(|_, event, _| Ok(event));

        let llm = Arc::new(ScriptedLlm::new());
        llm.push(Role::Reviewer, REJECTED);
        let reviewer = Reviewer::new(services(&temp, llm, Some(scm)));
        let mut state = tested_state();
        state.pr_number = Some(3);

        let delta = reviewer.run(&state).await.unwrap();
        assert_eq!(delta.code_reviewed, Some(false));
        assert_eq!(delta.review_attempt_count, Some(1));
        assert!(delta.review_comment.unwrap().contains("Validar tipos"));
    }

    #[tokio::test]
    async fn test_sentinel_answer_rejects_and_charges_counter() {
        let temp = TempDir::new().unwrap();
        let mut scm = MockScm::new();
        scm.expect_create_review()
            .withf(|pr, event, body| *pr == 4 && *event == ReviewEvent::Comment && body.contains("ERROR_API"))
            .times(1)
            .returning(|_, event, _| Ok(event));

        let llm = Arc::new(ScriptedLlm::new());
        llm.push(Role::Reviewer, "ERROR_API: 503 Service Unavailable");
        let reviewer = Reviewer::new(services(&temp, llm, Some(scm)));
        let mut state = tested_state();
        state.pr_number = Some(4);
        state.counters.review.set(1);

        let delta = reviewer.run(&state).await.unwrap();
        assert_eq!(delta.code_reviewed, Some(false));
        assert_eq!(delta.review_attempt_count, Some(2));
        assert_eq!(delta.review_score, Some(Some(0)));
        assert!(delta.review_comment.unwrap().starts_with("ERROR_API:"));

        let report = std::fs::read_to_string(temp.path().join("5_review_req1.txt")).unwrap();
        assert!(report.starts_with("Veredicto: RECHAZADO"));
    }

    #[tokio::test]
    async fn test_unreadable_answer_approves_with_fallback_score() {
        let temp = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLlm::new());
        llm.push(Role::Reviewer, "Parece correcto.");
        let reviewer = Reviewer::new(services(&temp, llm, None));

        let delta = reviewer.run(&tested_state()).await.unwrap();
        assert_eq!(delta.code_reviewed, Some(true));
        assert_eq!(delta.review_score, Some(Some(FALLBACK_SCORE)));
    }
}
