//! Test agent: generates unit tests, runs them in the sandbox and decides
//! who is to blame when they fail.
//!
//! Test-file faults are fixed by regenerating the tests, up to the
//! test-fix budget, without charging the debug counter. Production faults
//! charge the debug counter and send the traceback back to the developer.

use std::sync::Arc;

use async_trait::async_trait;
use forja_clients::{states, FileChange};
use forja_core::requirements::base_name_or_default;
use forja_core::{
    check_test_file, names, naming, strip_code_fences, tests_branch, CoreResult,
    FormalRequirements, Language, Node, NodeId, StateDelta, TestOutcome, WorkflowState,
};
use forja_llm::prompts::{TEST_ENGINEER_FIX_ONLY, TEST_ENGINEER_STRICT};
use forja_llm::{LlmRequest, Role};
use forja_runner::{classify, postprocess_typescript_tests, Classification, TestRun};
use tracing::{info, warn};

use crate::error::AgentResult;
use crate::services::{soft, soft_result, AgentServices};
use crate::tracking::display_title;

/// Bytes of failing output kept in a fix-only prompt.
pub const FIX_CONTEXT_BYTES: usize = 3500;

/// The last `max` bytes of `text`, cut on a character boundary.
pub fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Repository path of the unit-test file.
pub fn test_path(base_name: &str, language: Language) -> String {
    format!("src/test/{}", language.test_file_name(base_name))
}

/// How the sandbox loop ended.
enum Verdict {
    Passed(TestRun),
    ProductionFault(TestRun, Classification),
    /// The test-fix budget ran out while the tests themselves were at fault.
    TestFaultExhausted(TestRun, Classification),
}

pub struct TestAgent {
    services: Arc<AgentServices>,
}

impl TestAgent {
    pub fn new(services: Arc<AgentServices>) -> Self {
        Self { services }
    }

    fn context(state: &WorkflowState, code: &str, code_file: &str) -> String {
        let language = state.language();
        format!(
            "Requisitos formales:\n{}\n\nLenguaje: {}\nArchivo de código: {}\n\nCódigo a probar:\n```{}\n{}\n```",
            state.formal_requirements.trim(),
            language.as_str(),
            code_file,
            language.fence_tag(),
            code
        )
    }

    fn clean(raw: &str, language: Language) -> String {
        let tests = strip_code_fences(raw);
        match language {
            Language::TypeScript => postprocess_typescript_tests(&tests),
            Language::Python => tests,
        }
    }

    /// Ask for a test file; a truncated answer is regenerated once with a stricter prompt.
    async fn generate(&self, state: &WorkflowState, request: LlmRequest) -> AgentResult<String> {
        let language = state.language();
        let tests = Self::clean(&self.services.ask(request.clone()).await?, language);

        let check = check_test_file(&tests, language);
        if check.complete {
            return Ok(tests);
        }

        warn!("Generated tests look incomplete: {}", check.summary());
        let iteration = state.iteration();
        let debug_count = state.counters.debug.count;
        self.services.save(
            &names::malformed_tests(iteration, debug_count, 1),
            &format!("Problemas: {}\n\n{}", check.summary(), tests),
        );

        let strict = request.with_prompt_suffix(TEST_ENGINEER_STRICT);
        let retry = Self::clean(&self.services.ask(strict).await?, language);
        let recheck = check_test_file(&retry, language);
        if !recheck.complete {
            warn!("Regenerated tests are still incomplete: {}", recheck.summary());
            self.services.save(
                &names::malformed_tests(iteration, debug_count, 2),
                &format!("Problemas: {}\n\n{}", recheck.summary(), retry),
            );
        }
        Ok(retry)
    }

    /// Generate, run and regenerate until the tests pass or someone is blamed.
    async fn run_loop(
        &self,
        state: &WorkflowState,
        code: &str,
        code_file: &str,
        test_file: &str,
    ) -> AgentResult<(Verdict, String)> {
        let language = state.language();
        let sandbox = self.services.sandbox();
        sandbox.write_file(code_file, code)?;

        let base_request = LlmRequest::new(Role::TestEngineer, Self::context(state, code, code_file));
        let mut tests = self.generate(state, base_request.clone()).await?;
        let max_fixes = self.services.settings.budgets.max_test_fix_attempts;
        let mut fixes = 0;

        loop {
            sandbox.write_file(test_file, &tests)?;
            let run = sandbox.run_tests(language, test_file).await;
            if run.passed() {
                return Ok((Verdict::Passed(run), tests));
            }

            let classification = classify(language, &run.output, test_file);
            info!(
                "Test failure classified as {}: {}",
                classification.kind, classification.reason
            );
            if !classification.is_test_fault() {
                return Ok((Verdict::ProductionFault(run, classification), tests));
            }
            if fixes >= max_fixes {
                warn!("Test-fix budget ({}) spent on test-code faults", max_fixes);
                return Ok((Verdict::TestFaultExhausted(run, classification), tests));
            }

            fixes += 1;
            info!("Regenerating tests only ({}/{})", fixes, max_fixes);
            let fix_context = format!(
                "Tests anteriores:\n```{}\n{}\n```\n\nSalida del fallo:\n{}",
                language.fence_tag(),
                tests,
                tail(&run.output, FIX_CONTEXT_BYTES)
            );
            let request = LlmRequest::new(
                Role::TestEngineer,
                format!("{}\n\n{}", base_request.context, fix_context),
            )
            .with_prompt_suffix(TEST_ENGINEER_FIX_ONLY);
            tests = self.generate(state, request).await?;
        }
    }

    fn report(state: &WorkflowState, test_file: &str, run: &TestRun, classification: Option<&Classification>) -> String {
        let mut lines = vec![
            format!("Lenguaje: {}", state.language().as_str()),
            format!("Archivo de tests: {}", test_file),
            format!("Resultado: {}", run.outcome.as_str()),
            run.stats.summary(),
            format!("Duración: {} ms", run.duration_ms),
        ];
        if let Some(c) = classification {
            lines.push(format!("Clasificación: {} ({})", c.kind, c.reason));
        }
        lines.push(String::new());
        lines.push("Salida:".to_string());
        lines.push(run.output.clone());
        lines.join("\n")
    }

    async fn execute(&self, state: &WorkflowState) -> AgentResult<StateDelta> {
        let iteration = state.iteration();
        let debug_count = state.counters.debug.count;
        let language = state.language();
        let base_name = base_name_or_default(&state.formal_requirements);
        let code = strip_code_fences(&state.generated_code);
        let code_file = language.source_file_name(&base_name);
        let test_file = language.test_file_name(&base_name);

        let (verdict, tests) = self.run_loop(state, &code, &code_file, &test_file).await?;

        let mut delta = StateDelta {
            generated_tests: Some(tests.clone()),
            ..Default::default()
        };

        match verdict {
            Verdict::Passed(run) => {
                info!("Tests passed: {}", run.stats.summary());
                self.services.save(
                    &names::test_report(iteration, debug_count, TestOutcome::Passed),
                    &Self::report(state, &test_file, &run, None),
                );
                delta.tests_passed = Some(true);
                delta.test_regeneration_needed = Some(false);
                delta.traceback = Some(String::new());
                delta.debug_attempt_count = Some(0);
                delta.test_summary = Some(run.stats.summary());
                self.publish(state, &tests, &test_file, &run, &mut delta).await;
            }
            Verdict::ProductionFault(run, classification) => {
                warn!("Production code failed its tests: {}", run.stats.summary());
                self.services.save(
                    &names::test_report(iteration, debug_count, run.outcome),
                    &Self::report(state, &test_file, &run, Some(&classification)),
                );
                let traceback = if run.traceback.trim().is_empty() {
                    run.output.clone()
                } else {
                    run.traceback.clone()
                };
                delta.tests_passed = Some(false);
                delta.test_regeneration_needed = Some(false);
                delta.debug_attempt_count = Some(state.counters.debug.next());
                delta.traceback = Some(traceback);
                delta.test_summary = Some(run.stats.summary());
                self.comment_failure(state, &run, &classification).await;
            }
            Verdict::TestFaultExhausted(run, classification) => {
                self.services.save(
                    &names::test_report(iteration, debug_count, run.outcome),
                    &Self::report(state, &test_file, &run, Some(&classification)),
                );
                delta.tests_passed = Some(false);
                delta.test_regeneration_needed = Some(true);
                delta.test_summary = Some(run.stats.summary());
                self.comment_failure(state, &run, &classification).await;
            }
        }

        Ok(delta)
    }

    /// Commit the passing tests, open the PR and report to the testing task.
    async fn publish(
        &self,
        state: &WorkflowState,
        tests: &str,
        test_file: &str,
        run: &TestRun,
        delta: &mut StateDelta,
    ) {
        let scm = &self.services.collaborators.scm;
        let base_name = base_name_or_default(&state.formal_requirements);
        let language = state.language();
        let record = FormalRequirements::from_json(&state.formal_requirements).ok();
        let timestamp = naming::timestamp();

        let branch = match &state.branch_name {
            Some(branch) if !state.pr_merged => Some(branch.clone()),
            _ => {
                let name = tests_branch(&base_name, &timestamp);
                soft("open tests branch", scm.open_branch(&name)).await.map(|_| {
                    delta.branch_name = Some(Some(name.clone()));
                    name
                })
            }
        };

        let path = test_path(&base_name, language);
        if let Some(branch) = &branch {
            let files = [FileChange::new(path.clone(), tests)];
            let message = format!("test: unit tests for {} ({})", base_name, run.stats.summary());
            if let Some(commit) = soft("commit tests", scm.create_commit(branch, &files, &message)).await {
                info!("Committed {} to {} ({})", path, commit.branch, commit.sha);
            }

            let title = format!(
                "AI Generated Tests: {} [{}]",
                display_title(record.as_ref(), &base_name),
                timestamp
            );
            let body = format!(
                "Código y tests generados por el sistema multiagente.\n\n- Función: `{}`\n- Tests: {}\n- Iteración: {}",
                base_name,
                run.stats.summary(),
                state.iteration()
            );
            if let Some(pr) = soft("open pull request", scm.create_pr(branch, &title, &body)).await {
                info!("Pull request #{}: {}", pr.number, pr.url);
                delta.pr_number = Some(Some(pr.number));
                delta.pr_url = Some(Some(pr.url));
            }
        }

        if let Some(git) = &self.services.collaborators.local_git {
            if let Some(local) = soft_result("write local test copy", git.write_file(&path, tests)) {
                delta.local_test_path = Some(Some(local));
            }
        }

        let Some(task_id) = state.testing_task_id else {
            return;
        };
        let tracker = &self.services.collaborators.tracker;
        if state.is_first_pass() {
            soft(
                "move testing task to In Progress",
                tracker.set_state(task_id, states::IN_PROGRESS, None),
            )
            .await;
        }
        let sandbox_file = self.services.artifacts.path(test_file);
        soft(
            "attach test file",
            tracker.attach_file(task_id, &sandbox_file, "Tests unitarios generados"),
        )
        .await;
        let comment = format!(
            "✅ Tests unitarios superados: {}.{}",
            run.stats.summary(),
            state
                .pr_url
                .as_ref()
                .or(delta.pr_url.as_ref().and_then(|u| u.as_ref()))
                .map(|u| format!(" PR: {}", u))
                .unwrap_or_default()
        );
        soft("comment on testing task", tracker.add_comment(task_id, &comment)).await;
    }

    async fn comment_failure(&self, state: &WorkflowState, run: &TestRun, classification: &Classification) {
        let Some(task_id) = state.testing_task_id else {
            return;
        };
        let comment = format!(
            "❌ Tests fallidos: {}. Clasificación: {} ({}).",
            run.stats.summary(),
            classification.kind,
            classification.reason
        );
        soft(
            "comment on testing task",
            self.services.collaborators.tracker.add_comment(task_id, &comment),
        )
        .await;
    }
}

#[async_trait]
impl Node for TestAgent {
    fn id(&self) -> NodeId {
        NodeId::TestAgent
    }

    fn description(&self) -> &str {
        "Generates and runs the unit tests and classifies failures"
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
    use forja_runner::{MockResponse, MockRunner};
    use tempfile::TempDir;

    const REQUIREMENTS: &str = r#"{"objetivo_funcional": "Sumar", "lenguaje_version": "Python 3.12",
        "nombre_funcion": "sumar", "entradas_esperadas": "a, b", "salidas_esperadas": "suma"}"#;

    const SYNTAX_ERROR: &str =
        "E     File \"/out/test_sumar.py\", line 7\nE       def test_x(\nE   SyntaxError: '(' was never closed";

    const ASSERTION: &str =
        "test_sumar.py::test_sumar_positivos FAILED\nE       assert 6 == 5\n1 failed, 3 passed in 0.02s";

    fn setup(temp: &TempDir, runner: MockRunner) -> (TestAgent, Arc<ScriptedLlm>, MockRunner) {
        let llm = Arc::new(ScriptedLlm::new());
        let settings = Settings::default().with_output_dir(temp.path());
        let services =
            AgentServices::new(settings, llm.clone(), Arc::new(runner.clone())).unwrap();
        (TestAgent::new(Arc::new(services)), llm, runner)
    }

    fn state() -> WorkflowState {
        let mut state = WorkflowState::new("Sum", &Default::default());
        state.formal_requirements = REQUIREMENTS.to_string();
        state.generated_code = "def sumar(a, b):\n    return a + b".to_string();
        state.counters.attempt.set(1);
        state
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("abc", 10), "abc");
        assert_eq!(tail("añb", 2), "b");
    }

    #[tokio::test]
    async fn test_pass_resets_debug_counter() {
        let temp = TempDir::new().unwrap();
        let (agent, llm, runner) = setup(&temp, MockRunner::new());
        let mut s = state();
        s.counters.debug.set(2);
        s.traceback = "old".to_string();

        let delta = agent.run(&s).await.unwrap();
        assert_eq!(delta.tests_passed, Some(true));
        assert_eq!(delta.debug_attempt_count, Some(0));
        assert_eq!(delta.traceback.as_deref(), Some(""));
        assert!(delta.generated_tests.unwrap().contains("def test_sumar_positivos"));
        assert_eq!(llm.call_count(Role::TestEngineer), 1);
        assert_eq!(runner.call_count(), 1);

        assert!(temp.path().join("sumar.py").exists());
        assert!(temp.path().join("test_sumar.py").exists());
        assert!(temp.path().join("4_testing_req1_debug2_PASSED.txt").exists());
        assert!(llm.calls()[0].context.contains("Archivo de código: sumar.py"));
    }

    #[tokio::test]
    async fn test_test_fault_is_not_charged() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new()
            .add_response(MockResponse::failure(1, SYNTAX_ERROR, ""))
            .add_response(MockResponse::failure(1, ASSERTION, ""));
        let (agent, llm, _) = setup(&temp, runner);

        let delta = agent.run(&state()).await.unwrap();
        assert_eq!(delta.tests_passed, Some(false));
        assert_eq!(delta.debug_attempt_count, Some(1));
        assert_eq!(delta.test_regeneration_needed, Some(false));
        assert!(delta.traceback.unwrap().contains("assert 6 == 5"));

        let calls = llm.calls_for(Role::TestEngineer);
        assert_eq!(calls.len(), 2);
        assert!(calls[1].role_prompt.ends_with(TEST_ENGINEER_FIX_ONLY));
        assert!(calls[1].context.contains("SyntaxError"));
        assert!(temp.path().join("4_testing_req1_debug0_FAILED.txt").exists());
    }

    #[tokio::test]
    async fn test_fix_budget_exhausted() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new().with_default(MockResponse::failure(1, SYNTAX_ERROR, ""));
        let (agent, llm, runner) = setup(&temp, runner);

        let delta = agent.run(&state()).await.unwrap();
        assert_eq!(delta.tests_passed, Some(false));
        assert_eq!(delta.test_regeneration_needed, Some(true));
        assert!(delta.debug_attempt_count.is_none());
        assert_eq!(llm.call_count(Role::TestEngineer), 2);
        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_truncated_tests_are_regenerated_strictly() {
        let temp = TempDir::new().unwrap();
        let (agent, llm, _) = setup(&temp, MockRunner::new());
        llm.push(Role::TestEngineer, "```python\nimport pytest\nfrom sumar import sumar\n\ndef helper(");

        let delta = agent.run(&state()).await.unwrap();
        assert_eq!(delta.tests_passed, Some(true));

        let calls = llm.calls_for(Role::TestEngineer);
        assert_eq!(calls.len(), 2);
        assert!(calls[1].role_prompt.ends_with(TEST_ENGINEER_STRICT));
        assert!(temp
            .path()
            .join("4_testing_req1_debug0_MALFORMED_ATTEMPT1.txt")
            .exists());
    }
}
