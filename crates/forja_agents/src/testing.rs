//! Fixtures shared by the agent unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use forja_clients::{
    ClientResult, Collaborators, CommitResult, FileChange, MergeMethod, MergeResult, PullRequest,
    ReviewEvent, SourceControl,
};
use forja_core::{Settings, WorkflowState};
use forja_llm::ScriptedLlm;
use forja_runner::MockRunner;
use mockall::mock;
use tempfile::TempDir;

use crate::services::AgentServices;

pub const REQUIREMENTS: &str = r#"{"objetivo_funcional": "Sumar dos números", "lenguaje_version": "Python 3.12",
    "nombre_funcion": "sumar", "entradas_esperadas": "a, b", "salidas_esperadas": "suma"}"#;

pub const CODE: &str = "def sumar(a: float, b: float) -> float:\n    return a + b\n";

mock! {
    pub Scm {}

    #[async_trait]
    impl SourceControl for Scm {
        fn name(&self) -> &str;
        fn base_branch(&self) -> &str;
        async fn branch_sha(&self, branch: &str) -> ClientResult<String>;
        async fn create_branch(&self, base_sha: &str, name: &str) -> ClientResult<String>;
        async fn create_commit(
            &self,
            branch: &str,
            files: &[FileChange],
            message: &str,
        ) -> ClientResult<CommitResult>;
        async fn create_pr(&self, branch: &str, title: &str, body: &str) -> ClientResult<PullRequest>;
        async fn create_review(&self, pr: u64, event: ReviewEvent, body: &str) -> ClientResult<ReviewEvent>;
        async fn add_pr_comment(&self, pr: u64, body: &str) -> ClientResult<()>;
        async fn is_mergeable(&self, pr: u64) -> ClientResult<Option<bool>>;
        async fn merge_pr(
            &self,
            pr: u64,
            method: MergeMethod,
            title: &str,
            message: &str,
        ) -> ClientResult<MergeResult>;
        async fn delete_branch(&self, name: &str) -> ClientResult<()>;
        async fn get_pr_files(&self, pr: u64) -> ClientResult<Vec<String>>;
    }
}

/// Services writing into `temp`, with an optional mocked source-control host.
pub fn services(temp: &TempDir, llm: Arc<ScriptedLlm>, scm: Option<MockScm>) -> Arc<AgentServices> {
    let settings = Settings::default().with_output_dir(temp.path());
    let mut collaborators = Collaborators::disabled();
    if let Some(scm) = scm {
        collaborators = collaborators.with_scm(Arc::new(scm));
    }
    let services = AgentServices::new(settings, llm, Arc::new(MockRunner::new()))
        .unwrap()
        .with_collaborators(collaborators);
    Arc::new(services)
}

/// State after a passing test run on iteration 1.
pub fn tested_state() -> WorkflowState {
    let mut state = WorkflowState::new("Sum two numbers", &Default::default());
    state.formal_requirements = REQUIREMENTS.to_string();
    state.generated_code = CODE.to_string();
    state.generated_tests = "def test_sumar():\n    assert sumar(2, 3) == 5\n".to_string();
    state.test_summary = "1 passed, 0 failed (total 1)".to_string();
    state.tests_passed = true;
    state.quality_passed = true;
    state.counters.attempt.set(1);
    state
}
