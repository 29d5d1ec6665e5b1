//! Partial state updates returned by nodes.
//!
//! A node never mutates the shared state directly. It returns a [`StateDelta`]
//! listing only the fields it changed, and the executor applies the delta in
//! one step once the node returns.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::state::WorkflowState;

/// Fields a node wants to change. `None` means "leave as is".
///
/// Nullable handles use `Option<Option<T>>`: `Some(None)` clears the handle.
/// Counter fields carry the new count and are clamped to the counter bound.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub stakeholder_feedback: Option<String>,
    pub clarified_requirement: Option<String>,
    pub formal_requirements: Option<String>,

    pub generated_code: Option<String>,
    pub generated_tests: Option<String>,
    pub traceback: Option<String>,
    pub quality_issues: Option<String>,
    pub test_summary: Option<String>,

    pub tests_passed: Option<bool>,
    pub quality_passed: Option<bool>,
    pub code_reviewed: Option<bool>,
    pub validated: Option<bool>,
    pub pr_merged: Option<bool>,
    pub test_regeneration_needed: Option<bool>,

    pub attempt_count: Option<u32>,
    pub debug_attempt_count: Option<u32>,
    pub quality_attempt_count: Option<u32>,
    pub review_attempt_count: Option<u32>,

    pub pbi_id: Option<Option<u64>>,
    pub implementation_task_id: Option<Option<u64>>,
    pub testing_task_id: Option<Option<u64>>,

    pub branch_name: Option<Option<String>>,
    pub pr_number: Option<Option<u64>>,
    pub pr_url: Option<Option<String>>,
    pub local_code_path: Option<Option<PathBuf>>,
    pub local_test_path: Option<Option<PathBuf>>,

    pub review_comment: Option<String>,
    pub review_score: Option<Option<u8>>,
}

macro_rules! apply_fields {
    ($delta:expr, $state:expr, $changed:expr, $( $field:ident => $key:literal ),* $(,)?) => {
        $(
            if let Some(value) = $delta.$field {
                $state.$field = value;
                $changed.push($key);
            }
        )*
    };
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply the delta to `state` and return the serialized names of the fields written.
    pub fn apply(self, state: &mut WorkflowState) -> Vec<&'static str> {
        let mut changed = Vec::new();

        apply_fields!(self, state, changed,
            stakeholder_feedback => "feedback_stakeholder",
            clarified_requirement => "requisito_clarificado",
            formal_requirements => "requisitos_formales",
            generated_code => "codigo_generado",
            generated_tests => "tests_unitarios_generados",
            traceback => "traceback",
            quality_issues => "sonarqube_issues",
            test_summary => "resumen_pruebas",
            tests_passed => "pruebas_superadas",
            quality_passed => "sonarqube_passed",
            code_reviewed => "codigo_revisado",
            validated => "validado",
            pr_merged => "pr_mergeada",
            test_regeneration_needed => "test_regeneration_needed",
            pbi_id => "azure_pbi_id",
            implementation_task_id => "azure_implementation_task_id",
            testing_task_id => "azure_testing_task_id",
            branch_name => "github_branch_name",
            pr_number => "github_pr_number",
            pr_url => "github_pr_url",
            local_code_path => "github_local_code_path",
            local_test_path => "github_local_test_path",
            review_comment => "revision_comentario",
            review_score => "revision_puntuacion",
        );

        let counters = &mut state.counters;
        if let Some(count) = self.attempt_count {
            counters.attempt.set(count);
            changed.push("attempt_count");
        }
        if let Some(count) = self.debug_attempt_count {
            counters.debug.set(count);
            changed.push("debug_attempt_count");
        }
        if let Some(count) = self.quality_attempt_count {
            counters.quality.set(count);
            changed.push("sonarqube_attempt_count");
        }
        if let Some(count) = self.review_attempt_count {
            counters.review.set(count);
            changed.push("revisor_attempt_count");
        }

        changed
    }

    /// Serialized names of the fields this delta would write.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut scratch = WorkflowState::default();
        scratch.counters.attempt.max = u32::MAX;
        scratch.counters.debug.max = u32::MAX;
        scratch.counters.quality.max = u32::MAX;
        scratch.counters.review.max = u32::MAX;
        self.clone().apply(&mut scratch)
    }

    /// Merge `other` over `self`; fields set in `other` win.
    pub fn merge(mut self, other: StateDelta) -> Self {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $( if other.$field.is_some() { self.$field = other.$field; } )*
            };
        }
        take!(
            stakeholder_feedback, clarified_requirement, formal_requirements,
            generated_code, generated_tests, traceback, quality_issues, test_summary,
            tests_passed, quality_passed, code_reviewed, validated, pr_merged,
            test_regeneration_needed, attempt_count, debug_attempt_count,
            quality_attempt_count, review_attempt_count, pbi_id, implementation_task_id,
            testing_task_id, branch_name, pr_number, pr_url, local_code_path,
            local_test_path, review_comment, review_score,
        );
        self
    }
}
