//! End-to-end runs of the pipeline with scripted LLM answers, a mocked
//! test runner and in-memory collaborators.

mod common;

use std::sync::Arc;

use common::{FakeScm, FakeTracker, Harness};
use forja_agents::{AgentServices, Pipeline, RequirementsManager};
use forja_clients::tracker::fields;
use forja_clients::{states, Collaborators, ReviewEvent, WorkItemType};
use forja_core::{Node, NodeId, RetryBudgets, Settings, StepEvent, Terminal, WorkflowState};
use forja_llm::{MockLlm, Role};
use forja_runner::{MockResponse, MockRunner};
use regex::Regex;
use tempfile::TempDir;

const BAD_CODE: &str = "```python\ndef sumar(a: float, b: float) -> float:\n    try:\n        return a + b\n    except ValueError:\n        pass\n```";

const TEST_SYNTAX_ERROR: &str =
    "E     File \"/out/test_sumar.py\", line 9\nE       def test_sumar_decimales(\nE   SyntaxError: '(' was never closed";

const PRODUCTION_FAILURE: &str = "test_sumar.py::test_sumar_positivos FAILED\nE       assert 6 == 5\nE        +  where 6 = sumar(2, 3)\n1 failed, 3 passed in 0.03s";

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_happy_path_single_iteration() {
    let harness = Harness::new();
    let log = harness.run("Sum two numbers in Python").await;

    assert_eq!(log.terminal, Some(Terminal::Success));
    assert!(log.state.validated);
    assert!(log.state.tests_passed && log.state.code_reviewed);
    assert_eq!(log.state.counters.attempt.count, 1);
    assert_eq!(log.state.counters.debug.count, 0);
    assert_eq!(log.state.counters.quality.count, 0);
    assert_eq!(log.visits.len(), 7);

    assert!(harness.artifact("sumar.py"));
    assert!(harness.artifact("1_requirements_manager_intento_1.json"));
    assert!(harness.artifact("4_testing_req1_debug0_PASSED.txt"));
    assert!(harness.artifact("6_complete_pr_req1_OMITIDO.txt"));
    assert!(harness.artifact("7_stakeholder_intento_1_VALIDADO.txt"));
    assert!(harness.artifact("logs"));
}

#[tokio::test]
async fn test_quality_loop_then_pass() {
    let harness = Harness::new();
    harness.llm.push(Role::Developer, BAD_CODE);

    let log = harness.run("Sum two numbers in Python").await;

    assert_eq!(log.terminal, Some(Terminal::Success));
    assert_eq!(log.visits_of(NodeId::QualityGate), 2);
    assert_eq!(log.visits_of(NodeId::Developer), 2);
    assert_eq!(log.state.counters.quality.count, 0);
    assert_eq!(harness.llm.call_count(Role::QualityAnalyst), 1);

    let corrections = harness.llm.calls_for(Role::Developer);
    assert!(corrections[1].context.contains("Instrucciones de calidad"));

    let first = std::fs::read_to_string(harness.temp.path().join("3_sonarqube_report_req1_sq0.txt")).unwrap();
    assert!(first.contains("S2737"));
    assert!(harness.artifact("3_sonarqube_instrucciones_req1_sq0.txt"));
    assert!(harness.artifact("3_sonarqube_report_req1_sq1.txt"));
    assert!(harness.artifact("2_developer_req1_debug0_sq1.py"));
}

#[tokio::test]
async fn test_test_bug_is_not_charged_but_production_bug_is() {
    let runner = MockRunner::new()
        .add_response(MockResponse::failure(2, TEST_SYNTAX_ERROR, ""))
        .add_response(MockResponse::failure(1, PRODUCTION_FAILURE, ""));
    let harness = Harness::new().runner(runner);

    let log = harness.run("Sum two numbers in Python").await;

    assert_eq!(log.terminal, Some(Terminal::Success));
    assert_eq!(log.visits_of(NodeId::TestAgent), 2);
    assert_eq!(log.visits_of(NodeId::Developer), 2);
    assert_eq!(harness.llm.call_count(Role::TestEngineer), 3);
    assert!(!log.state.test_regeneration_needed);

    // One debug charge for the assertion failure, reset by the final pass.
    assert!(harness.artifact("4_testing_req1_debug0_FAILED.txt"));
    assert!(harness.artifact("2_developer_req1_debug1_sq0.py"));
    assert!(harness.artifact("4_testing_req1_debug1_PASSED.txt"));
    assert_eq!(log.state.counters.debug.count, 0);

    let correction = &harness.llm.calls_for(Role::Developer)[1];
    assert!(correction.context.contains("assert 6 == 5"));
}

#[tokio::test]
async fn test_test_fix_budget_exhausted_ends_without_debug_charge() {
    let runner = MockRunner::new().with_default(MockResponse::failure(2, TEST_SYNTAX_ERROR, ""));
    let harness = Harness::new().runner(runner);

    let log = harness.run("Sum two numbers in Python").await;

    assert_eq!(log.terminal, Some(Terminal::DebugLimitExceeded));
    assert!(log.state.test_regeneration_needed);
    assert_eq!(log.state.counters.debug.count, 0);
    assert_eq!(log.visits_of(NodeId::Developer), 1);
}

#[tokio::test]
async fn test_stakeholder_rejection_then_acceptance() {
    let budgets = RetryBudgets {
        max_attempts: 2,
        ..Default::default()
    };
    let harness = Harness::new().budgets(budgets);
    harness.llm.push(
        Role::Stakeholder,
        "VALIDACIÓN FINAL: RECHAZADO\nMotivo: requires variable-arity arguments",
    );

    let log = harness.run("Sum two numbers in Python").await;

    assert_eq!(log.terminal, Some(Terminal::Success));
    assert_eq!(log.state.counters.attempt.count, 2);
    assert!(log.state.stakeholder_feedback.is_empty());
    assert_eq!(log.visits_of(NodeId::RequirementsManager), 2);

    let second = &harness.llm.calls_for(Role::RequirementsManager)[1];
    assert!(second.context.contains("requires variable-arity arguments"));
    assert!(harness.artifact("7_stakeholder_intento_1_RECHAZADO.txt"));
    assert!(harness.artifact("7_stakeholder_intento_2_VALIDADO.txt"));
}

#[tokio::test]
async fn test_outer_budget_exhausted() {
    let harness = Harness::new();
    harness.llm.push(
        Role::Stakeholder,
        "VALIDACIÓN FINAL: RECHAZADO\nMotivo: no cumple el formato",
    );

    let log = harness.run("Sum two numbers in Python").await;

    assert_eq!(log.terminal, Some(Terminal::FinalFailure));
    assert!(!log.state.validated);
    assert_eq!(log.state.counters.attempt.count, 1);
    assert!(!log.succeeded());
    assert!(harness.artifact("1_requirements_manager_intento_1.json"));
    assert!(harness.artifact("2_developer_req1_debug0_sq0.py"));
}

#[tokio::test]
async fn test_branch_names_are_sanitized() {
    let scm = Arc::new(FakeScm::default());
    let harness = Harness::new().collaborators(Collaborators::disabled().with_scm(scm.clone()));
    harness.llm.push(
        Role::RequirementsManager,
        r#"{"objetivo_funcional": "Tests for [my/func]@{v1}", "lenguaje_version": "Python 3.12",
            "nombre_funcion": "Tests for [my/func]@{v1}", "entradas_esperadas": "a, b",
            "salidas_esperadas": "suma"}"#,
    );

    let log = harness.run("Tests for [my/func]@{v1}").await;
    assert_eq!(log.terminal, Some(Terminal::Success));

    let branches = scm.branches.lock().clone();
    assert_eq!(branches.len(), 1);
    let safe = Regex::new(r"^[A-Za-z0-9._/-]+$").unwrap();
    for branch in &branches {
        assert!(safe.is_match(branch), "unsafe branch {}", branch);
        assert!(!branch.contains("..") && !branch.contains("@{"));
    }

    // Code and tests land on the same branch and PR, which is then merged.
    let commits = scm.commits.lock().clone();
    assert_eq!(commits.len(), 2);
    assert!(commits.iter().all(|(b, _)| b == &branches[0]));
    assert_eq!(commits[1].1, vec!["src/test/test_tests_for_my_func_v1.py"]);
    assert_eq!(*scm.reviews.lock(), vec![ReviewEvent::Approve]);
    assert_eq!(scm.merged.lock()[0].0, 1);
    assert_eq!(*scm.deleted.lock(), branches);
    assert!(log.state.pr_merged);
}

#[tokio::test]
async fn test_second_iteration_opens_fresh_pull_request() {
    let scm = Arc::new(FakeScm::default());
    let budgets = RetryBudgets {
        max_attempts: 2,
        ..Default::default()
    };
    let harness = Harness::new()
        .budgets(budgets)
        .collaborators(Collaborators::disabled().with_scm(scm.clone()));
    harness.llm.push(
        Role::Stakeholder,
        "VALIDACIÓN FINAL: RECHAZADO\nMotivo: requires variable-arity arguments",
    );

    let log = harness.run("Sum two numbers in Python").await;

    assert_eq!(log.terminal, Some(Terminal::Success));
    assert_eq!(log.state.counters.attempt.count, 2);
    assert_eq!(scm.branches.lock().len(), 2);
    assert_eq!(scm.merged_prs(), vec![1, 2]);
    assert_eq!(*scm.reviews.lock(), vec![ReviewEvent::Approve, ReviewEvent::Approve]);
    assert_eq!(scm.deleted.lock().len(), 2);

    // Merge cleanup drops the handles of the merged PR.
    assert!(log.state.pr_merged);
    assert!(log.state.branch_name.is_none());
    assert!(log.state.pr_number.is_none());
    assert!(log.state.pr_url.is_none());
}

#[tokio::test]
async fn test_failed_branch_after_merge_does_not_reuse_merged_pr() {
    let scm = Arc::new(FakeScm::with_branch_limit(1));
    let budgets = RetryBudgets {
        max_attempts: 2,
        ..Default::default()
    };
    let harness = Harness::new()
        .budgets(budgets)
        .collaborators(Collaborators::disabled().with_scm(scm.clone()));
    harness.llm.push(
        Role::Stakeholder,
        "VALIDACIÓN FINAL: RECHAZADO\nMotivo: requires variable-arity arguments",
    );

    let log = harness.run("Sum two numbers in Python").await;

    assert_eq!(log.terminal, Some(Terminal::Success));
    assert_eq!(log.state.counters.attempt.count, 2);
    assert_eq!(scm.branches.lock().len(), 1);
    assert_eq!(scm.merged_prs(), vec![1]);
    assert_eq!(*scm.reviews.lock(), vec![ReviewEvent::Approve]);
    assert!(log.state.pr_number.is_none());
    assert!(harness.artifact("6_complete_pr_req2_OMITIDO.txt"));
}

// ============================================================================
// Boundaries and idempotence
// ============================================================================

#[tokio::test]
async fn test_zero_debug_budget_stops_at_first_failure() {
    let budgets = RetryBudgets {
        max_debug_attempts: 0,
        ..Default::default()
    };
    let runner = MockRunner::new().with_default(MockResponse::failure(1, PRODUCTION_FAILURE, ""));
    let harness = Harness::new().budgets(budgets).runner(runner);

    let log = harness.run("Sum two numbers in Python").await;

    assert_eq!(log.terminal, Some(Terminal::DebugLimitExceeded));
    assert_eq!(log.visits_of(NodeId::Developer), 1);
    assert_eq!(log.state.counters.debug.count, 0);
}

#[tokio::test]
async fn test_mock_mode_runs_offline() {
    let temp = TempDir::new().unwrap();
    let settings = Settings::default()
        .with_output_dir(temp.path())
        .with_mock_mode(true);
    let services = AgentServices::new(settings, Arc::new(MockLlm::new()), Arc::new(MockRunner::new())).unwrap();

    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();
    let log = Pipeline::new(Arc::new(services))
        .run("Sum two numbers in TypeScript", Some(sender))
        .await
        .unwrap();

    assert!(log.succeeded());
    assert!(temp.path().join("sumar.ts").exists());
    assert!(temp.path().join("package.json").exists());

    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    assert_eq!(
        events.last(),
        Some(&StepEvent::Finished {
            terminal: Terminal::Success
        })
    );
}

#[tokio::test]
async fn test_work_items_created_once_and_closed_in_order() {
    let tracker = Arc::new(FakeTracker::default());
    let harness =
        Harness::new().collaborators(Collaborators::disabled().with_tracker(tracker.clone()));

    let log = harness.run("Sum two numbers in Python").await;
    assert!(log.succeeded());

    let pbi = log.state.pbi_id.unwrap();
    let implementation = log.state.implementation_task_id.unwrap();
    let testing = log.state.testing_task_id.unwrap();
    assert_eq!(tracker.created(), 3);

    let closing: Vec<String> = tracker
        .events()
        .into_iter()
        .filter(|e| e.ends_with(fields::STATE))
        .collect();
    assert_eq!(
        closing[closing.len() - 3..],
        [
            format!("update #{} {}", implementation, fields::STATE),
            format!("update #{} {}", testing, fields::STATE),
            format!("update #{} {}", pbi, fields::STATE),
        ]
    );
    for id in [pbi, implementation, testing] {
        assert_eq!(tracker.item(id).unwrap().state(), Some(states::DONE));
    }
    assert_eq!(
        tracker.item(pbi).unwrap().work_item_type(),
        Some(WorkItemType::ProductBacklogItem.as_str())
    );
    assert_eq!(tracker.item(testing).unwrap().work_item_type(), Some("Task"));

    let note = tracker.item(pbi).unwrap();
    assert!(note.field("Custom.ReleaseNote").is_some());
    assert!(!harness.artifact("release_note_req1.md"));
    assert!(tracker.events().contains(&format!("attach #{} sumar.py", pbi)));
    assert!(tracker.events().contains(&format!("attach #{} test_sumar.py", testing)));
}

#[tokio::test]
async fn test_existing_pbi_is_not_recreated() {
    let tracker = Arc::new(FakeTracker::default());
    let harness =
        Harness::new().collaborators(Collaborators::disabled().with_tracker(tracker.clone()));
    let node = RequirementsManager::new(harness.services());

    let mut state = WorkflowState::new("Sum two numbers in Python", &RetryBudgets::default());
    state.pbi_id = Some(42);
    let delta = node.run(&state).await.unwrap();

    assert!(delta.pbi_id.is_none());
    assert_eq!(tracker.created(), 0);
}
