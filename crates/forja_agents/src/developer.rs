//! Developer: generates or corrects the production code.

use std::sync::Arc;

use async_trait::async_trait;
use forja_clients::FileChange;
use forja_core::requirements::base_name_or_default;
use forja_core::{
    developer_branch, names, naming, strip_code_fences, CoreResult, FormalRequirements, Language,
    Node, NodeId, StateDelta, WorkflowState,
};
use forja_llm::{LlmRequest, Role};
use tracing::{debug, info};

use crate::error::AgentResult;
use crate::services::{soft, soft_result, AgentServices};
use crate::tracking::{find_or_create_task, TaskKind};

/// Repository path of the production code for a base name.
pub fn source_path(base_name: &str, language: Language) -> String {
    format!("src/main/{}", language.source_file_name(base_name))
}

pub struct Developer {
    services: Arc<AgentServices>,
}

impl Developer {
    pub fn new(services: Arc<AgentServices>) -> Self {
        Self { services }
    }

    /// Prompt context: requirements always, then whatever the last gate reported.
    pub fn context(state: &WorkflowState) -> String {
        let language = state.language();
        let mut context = format!(
            "Requisitos formales:\n{}\n\nLenguaje: {}",
            state.formal_requirements.trim(),
            language.as_str()
        );

        if state.is_correction() {
            context.push_str(&format!(
                "\n\nCódigo anterior:\n```{}\n{}\n```",
                language.fence_tag(),
                strip_code_fences(&state.generated_code)
            ));
        }
        if !state.traceback.trim().is_empty() {
            context.push_str(&format!("\n\nTraceback de las pruebas:\n{}", state.traceback.trim()));
        }
        if !state.quality_issues.trim().is_empty() {
            context.push_str(&format!(
                "\n\nInstrucciones de calidad (SonarQube):\n{}",
                state.quality_issues.trim()
            ));
        }
        if !state.code_reviewed && !state.review_comment.trim().is_empty() {
            context.push_str(&format!(
                "\n\nComentario de revisión:\n{}",
                state.review_comment.trim()
            ));
        }
        context
    }

    async fn execute(&self, state: &WorkflowState) -> AgentResult<StateDelta> {
        let iteration = state.iteration();
        let debug_count = state.counters.debug.count;
        let quality_count = state.counters.quality.count;
        let language = state.language();
        info!(
            "Developer run: req{} debug{} sq{}{}",
            iteration,
            debug_count,
            quality_count,
            if state.is_correction() { " (correction)" } else { "" }
        );

        let raw = self
            .services
            .ask(LlmRequest::new(Role::Developer, Self::context(state)))
            .await?;
        let code = strip_code_fences(&raw);
        self.services.save(
            &names::developer(iteration, debug_count, quality_count, language),
            &code,
        );

        let mut delta = StateDelta {
            generated_code: Some(code.clone()),
            traceback: Some(String::new()),
            ..Default::default()
        };

        let record = FormalRequirements::from_json(&state.formal_requirements).ok();
        if state.is_first_pass() {
            if let (Some(pbi_id), Some(record)) = (state.pbi_id, record.as_ref()) {
                self.ensure_tasks(pbi_id, record, &mut delta).await;
            }
        }
        self.publish(state, &code, language, &mut delta).await;

        Ok(delta)
    }

    async fn ensure_tasks(&self, pbi_id: u64, record: &FormalRequirements, delta: &mut StateDelta) {
        let tracker = self.services.collaborators.tracker.as_ref();
        if let Some(task) = find_or_create_task(tracker, record, pbi_id, TaskKind::Implementation).await {
            delta.implementation_task_id = Some(Some(task.id));
        }
        if let Some(task) = find_or_create_task(tracker, record, pbi_id, TaskKind::Testing).await {
            delta.testing_task_id = Some(Some(task.id));
        }
    }

    /// Commit the code to the iteration branch, opening it on the first pass.
    async fn publish(&self, state: &WorkflowState, code: &str, language: Language, delta: &mut StateDelta) {
        let scm = &self.services.collaborators.scm;
        let base_name = base_name_or_default(&state.formal_requirements);

        // A merged branch is gone; the next iteration starts a fresh one.
        let branch = match &state.branch_name {
            Some(existing) if !state.pr_merged => Some(existing.clone()),
            _ => {
                let name = developer_branch(&base_name, &naming::timestamp());
                let opened = soft("open branch", scm.open_branch(&name)).await;
                if opened.is_some() {
                    info!("Opened branch {}", name);
                    delta.branch_name = Some(Some(name.clone()));
                    delta.pr_number = Some(None);
                    delta.pr_url = Some(None);
                    delta.pr_merged = Some(false);
                }
                opened.map(|_| name)
            }
        };
        let Some(branch) = branch else {
            debug!("No source-control branch, code stays local");
            return;
        };

        let path = source_path(&base_name, language);
        let message = format!(
            "feat: {} (req{} debug{} sq{})",
            base_name,
            state.iteration(),
            state.counters.debug.count,
            state.counters.quality.count
        );
        let files = [FileChange::new(path.clone(), code)];
        if let Some(commit) = soft("commit code", scm.create_commit(&branch, &files, &message)).await {
            info!("Committed {} to {} ({})", path, commit.branch, commit.sha);
        }

        if let Some(git) = &self.services.collaborators.local_git {
            if let Some(local) = soft_result("write local code copy", git.write_file(&path, code)) {
                delta.local_code_path = Some(Some(local));
            }
        }
    }
}

#[async_trait]
impl Node for Developer {
    fn id(&self) -> NodeId {
        NodeId::Developer
    }

    fn description(&self) -> &str {
        "Generates the production code and corrects it from gate feedback"
    }

    async fn run(&self, state: &WorkflowState) -> CoreResult<StateDelta> {
        self.execute(state).await.map_err(|e| e.into_core(self.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forja_core::Settings;
    use forja_llm::ScriptedLlm;
    use forja_runner::MockRunner;
    use tempfile::TempDir;

    const REQUIREMENTS: &str = r#"{"objetivo_funcional": "Sumar", "lenguaje_version": "Python 3.12",
        "nombre_funcion": "sumar", "entradas_esperadas": "a, b", "salidas_esperadas": "suma"}"#;

    fn state() -> WorkflowState {
        let mut state = WorkflowState::new("Sum two numbers", &Default::default());
        state.formal_requirements = REQUIREMENTS.to_string();
        state.counters.attempt.set(1);
        state
    }

    #[test]
    fn test_context_first_pass() {
        let context = Developer::context(&state());
        assert!(context.contains("\"nombre_funcion\": \"sumar\""));
        assert!(context.contains("Lenguaje: python"));
        assert!(!context.contains("Código anterior"));
    }

    #[test]
    fn test_context_correction() {
        let mut s = state();
        s.generated_code = "def sumar(a, b):\n    return a - b".to_string();
        s.traceback = "AssertionError: assert -1 == 5".to_string();
        s.quality_issues = "1. [CRITICAL] Línea 2".to_string();
        s.review_comment = "Falta validar tipos".to_string();

        let context = Developer::context(&s);
        assert!(context.contains("Código anterior:\n```python\ndef sumar"));
        assert!(context.contains("Traceback de las pruebas:\nAssertionError"));
        assert!(context.contains("Instrucciones de calidad"));
        assert!(context.contains("Comentario de revisión:\nFalta validar tipos"));

        s.code_reviewed = true;
        assert!(!Developer::context(&s).contains("Comentario de revisión"));
    }

    #[test]
    fn test_source_path() {
        assert_eq!(source_path("sumar", Language::Python), "src/main/sumar.py");
        assert_eq!(source_path("calc_media", Language::TypeScript), "src/main/calc_media.ts");
    }

    #[tokio::test]
    async fn test_run_writes_code_and_clears_traceback() {
        let temp = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLlm::new());
        llm.push(Role::Developer, "```python\ndef sumar(a: float, b: float) -> float:\n    return a + b\n```");
        let settings = Settings::default().with_output_dir(temp.path());
        let services = AgentServices::new(settings, llm, Arc::new(MockRunner::new())).unwrap();
        let node = Developer::new(Arc::new(services));

        let mut s = state();
        s.traceback = "boom".to_string();
        let delta = node.run(&s).await.unwrap();

        assert!(delta.generated_code.as_ref().unwrap().starts_with("def sumar"));
        assert_eq!(delta.traceback.as_deref(), Some(""));
        assert!(delta.debug_attempt_count.is_none());
        assert!(delta.branch_name.is_none());
        assert!(temp.path().join("2_developer_req1_debug0_sq0.py").exists());
    }
}
