//! Acceptance rule of the quality gate.

use serde::{Deserialize, Serialize};

use crate::findings::{FindingsReport, IssueType, Severity};

/// What decided a gate result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecidedBy {
    /// The cloud service returned an explicit quality-gate verdict.
    ServiceVerdict,
    /// The local thresholds were applied to the findings summary.
    Thresholds,
}

/// Result of a gate evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub passed: bool,
    pub decided_by: DecidedBy,
    pub details: Vec<GateDetail>,
    pub recommendations: Vec<String>,
}

impl GateResult {
    fn new(passed: bool, decided_by: DecidedBy) -> Self {
        Self {
            passed,
            decided_by,
            details: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: GateDetail) -> Self {
        self.details.push(detail);
        self
    }

    pub fn with_recommendation(mut self, rec: impl Into<String>) -> Self {
        self.recommendations.push(rec.into());
        self
    }

    /// One-line verdict for logs and comments.
    pub fn verdict_line(&self) -> String {
        let verdict = if self.passed { "APROBADO" } else { "RECHAZADO" };
        let failed: Vec<&str> = self
            .details
            .iter()
            .filter(|d| !d.passed)
            .filter_map(|d| d.message.as_deref())
            .collect();
        if failed.is_empty() {
            format!("Quality gate {}", verdict)
        } else {
            format!("Quality gate {}: {}", verdict, failed.join("; "))
        }
    }
}

/// Detail about one gate check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDetail {
    pub check: String,
    pub passed: bool,
    pub message: Option<String>,
}

impl GateDetail {
    pub fn passed(check: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            passed: true,
            message: None,
        }
    }

    pub fn failed(check: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            passed: false,
            message: Some(message.into()),
        }
    }
}

/// Thresholds a findings summary must stay within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceRule {
    pub max_blocker: usize,
    pub max_critical: usize,
    pub max_bugs: usize,
}

impl Default for AcceptanceRule {
    fn default() -> Self {
        Self {
            max_blocker: 0,
            max_critical: 2,
            max_bugs: 0,
        }
    }
}

impl AcceptanceRule {
    /// Evaluate a findings record.
    ///
    /// An explicit service verdict wins; otherwise the thresholds apply.
    pub fn evaluate(&self, report: &FindingsReport) -> GateResult {
        if let Some(status) = &report.quality_gate {
            if let Some(passed) = status.verdict() {
                let mut result = GateResult::new(passed, DecidedBy::ServiceVerdict);
                result = if passed {
                    result.with_detail(GateDetail::passed("quality_gate"))
                } else {
                    result.with_detail(GateDetail::failed(
                        "quality_gate",
                        format!("quality gate del servicio en estado {}", status.status),
                    ))
                };
                for condition in &status.failed_conditions {
                    result = result.with_recommendation(format!("Corregir condición: {}", condition));
                }
                return result;
            }
        }

        let checks = [
            ("blocker", report.summary.severity(Severity::Blocker), self.max_blocker, "BLOCKER"),
            ("critical", report.summary.severity(Severity::Critical), self.max_critical, "CRITICAL"),
            ("bugs", report.summary.of_type(IssueType::Bug), self.max_bugs, "BUG"),
        ];

        let mut result = GateResult::new(true, DecidedBy::Thresholds);
        for (check, count, max, label) in checks {
            if count > max {
                result.passed = false;
                result = result
                    .with_detail(GateDetail::failed(check, format!("{} {} (máximo {})", count, label, max)))
                    .with_recommendation(format!("Reducir los issues {} a {} o menos", label, max));
            } else {
                result = result.with_detail(GateDetail::passed(check));
            }
        }
        result
    }
}
