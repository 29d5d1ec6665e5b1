//! The workflow state threaded through every node.
//!
//! Field names follow Rust conventions; the serialized form keeps the
//! historical keys (`prompt_inicial`, `codigo_generado`, ...) so persisted
//! execution logs stay readable next to the artifact files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::RetryBudgets;
use crate::language::Language;

/// A bounded retry counter.
///
/// `count` never exceeds `max`: increments saturate at the bound, so the
/// invariant `0 <= count <= max` holds for every reachable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Counter {
    pub count: u32,
    pub max: u32,
}

impl Counter {
    pub fn new(max: u32) -> Self {
        Self { count: 0, max }
    }

    /// Value after one increment, clamped to the bound.
    pub fn next(&self) -> u32 {
        self.count.saturating_add(1).min(self.max)
    }

    /// Set the count, clamped to the bound.
    pub fn set(&mut self, count: u32) {
        self.count = count.min(self.max);
    }

    pub fn increment(&mut self) {
        self.count = self.next();
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Whether the bound has been reached.
    pub fn exhausted(&self) -> bool {
        self.count >= self.max
    }

    pub fn remaining(&self) -> u32 {
        self.max - self.count.min(self.max)
    }
}

/// Retry counters for the outer loop and the three inner loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RetryCounters {
    /// Outer stakeholder loop.
    pub attempt: Counter,
    /// Test-failure loop.
    pub debug: Counter,
    /// Static-quality loop.
    pub quality: Counter,
    /// Code-review loop.
    pub review: Counter,
}

impl RetryCounters {
    pub fn from_budgets(budgets: &RetryBudgets) -> Self {
        Self {
            attempt: Counter::new(budgets.max_attempts),
            debug: Counter::new(budgets.max_debug_attempts),
            quality: Counter::new(budgets.max_sonarqube_attempts),
            review: Counter::new(budgets.max_revisor_attempts),
        }
    }
}

/// The record passed between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkflowState {
    // User input and formalization
    #[serde(rename = "prompt_inicial")]
    pub initial_prompt: String,
    #[serde(rename = "feedback_stakeholder")]
    pub stakeholder_feedback: String,
    #[serde(rename = "requisito_clarificado")]
    pub clarified_requirement: String,
    /// Formal requirements as JSON text, or an `ERROR_PARSING:` marker.
    #[serde(rename = "requisitos_formales")]
    pub formal_requirements: String,

    // Artifacts
    /// Latest source text; may still carry markdown fences.
    #[serde(rename = "codigo_generado")]
    pub generated_code: String,
    #[serde(rename = "tests_unitarios_generados")]
    pub generated_tests: String,
    pub traceback: String,
    /// Correction instructions synthesized from analyzer findings.
    #[serde(rename = "sonarqube_issues")]
    pub quality_issues: String,
    /// One-line summary of the last test run.
    #[serde(rename = "resumen_pruebas")]
    pub test_summary: String,

    // Gate outcomes
    #[serde(rename = "pruebas_superadas")]
    pub tests_passed: bool,
    #[serde(rename = "sonarqube_passed")]
    pub quality_passed: bool,
    #[serde(rename = "codigo_revisado")]
    pub code_reviewed: bool,
    #[serde(rename = "validado")]
    pub validated: bool,
    #[serde(rename = "pr_mergeada")]
    pub pr_merged: bool,
    pub test_regeneration_needed: bool,

    pub counters: RetryCounters,

    // Issue tracker handles
    #[serde(rename = "azure_pbi_id")]
    pub pbi_id: Option<u64>,
    #[serde(rename = "azure_implementation_task_id")]
    pub implementation_task_id: Option<u64>,
    #[serde(rename = "azure_testing_task_id")]
    pub testing_task_id: Option<u64>,

    // Source-control handles
    #[serde(rename = "github_branch_name")]
    pub branch_name: Option<String>,
    #[serde(rename = "github_pr_number")]
    pub pr_number: Option<u64>,
    #[serde(rename = "github_pr_url")]
    pub pr_url: Option<String>,
    #[serde(rename = "github_local_code_path")]
    pub local_code_path: Option<PathBuf>,
    #[serde(rename = "github_local_test_path")]
    pub local_test_path: Option<PathBuf>,

    // Review feedback
    #[serde(rename = "revision_comentario")]
    pub review_comment: String,
    #[serde(rename = "revision_puntuacion")]
    pub review_score: Option<u8>,
}

impl WorkflowState {
    /// Fresh state for a user prompt with counters bounded by `budgets`.
    pub fn new(prompt: impl Into<String>, budgets: &RetryBudgets) -> Self {
        Self {
            initial_prompt: prompt.into(),
            counters: RetryCounters::from_budgets(budgets),
            ..Default::default()
        }
    }

    /// Current requirements iteration (the outer attempt count).
    pub fn iteration(&self) -> u32 {
        self.counters.attempt.count
    }

    /// Target language declared by the formal requirements.
    pub fn language(&self) -> Language {
        Language::from_requirements(&self.formal_requirements)
    }

    /// True on the first developer pass of an iteration.
    ///
    /// A pass and approval reset the debug and quality counters, so a review
    /// rejection still awaiting its fix marks the pass as a correction.
    pub fn is_first_pass(&self) -> bool {
        self.counters.debug.count == 0 && self.counters.quality.count == 0 && !self.review_pending()
    }

    /// The last review rejected the code and the developer has not yet answered it.
    pub fn review_pending(&self) -> bool {
        !self.code_reviewed && !self.review_comment.trim().is_empty()
    }

    pub fn has_feedback(&self) -> bool {
        !self.stakeholder_feedback.trim().is_empty()
    }

    /// Whether the developer is correcting earlier output rather than starting fresh.
    pub fn is_correction(&self) -> bool {
        !self.generated_code.trim().is_empty()
            && (!self.traceback.trim().is_empty()
                || !self.quality_issues.trim().is_empty()
                || self.review_pending())
    }
}
