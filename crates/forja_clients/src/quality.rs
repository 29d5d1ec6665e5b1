//! Cloud static-analysis interface.

use std::collections::BTreeMap;

use async_trait::async_trait;
use forja_policy::{AnalysisSource, Finding, FindingsReport, QualityGateStatus};
use tracing::info;

use crate::error::ClientResult;

/// Outcome of [`CloudQuality::analyze_branch`].
#[derive(Debug, Clone)]
pub struct CloudAnalysis {
    pub report: FindingsReport,
    /// Branch whose analysis was read; `None` for the project's default branch.
    pub branch_analyzed: Option<String>,
}

impl CloudAnalysis {
    pub fn used_default_branch(&self) -> bool {
        self.branch_analyzed.is_none()
    }
}

/// Read-only access to a hosted static-analysis project.
#[async_trait]
pub trait CloudQuality: Send + Sync {
    fn name(&self) -> &str;

    /// Check that the service answers and the project exists.
    async fn verify_project(&self) -> ClientResult<()>;

    /// Branches with an analysis.
    async fn list_branches(&self) -> ClientResult<Vec<String>>;

    /// Open issues; `branch = None` reads the default branch.
    async fn get_issues(&self, branch: Option<&str>, severities: &[&str]) -> ClientResult<Vec<Finding>>;

    async fn get_quality_gate_status(&self, branch: Option<&str>) -> ClientResult<QualityGateStatus>;

    async fn get_metrics(&self, branch: Option<&str>) -> ClientResult<BTreeMap<String, String>>;

    /// Issues, gate status and metrics of `branch`.
    ///
    /// A branch without issues (or whose issues cannot be read) is treated as
    /// not analyzed yet; when `fallback_to_default` is set the default branch
    /// is read instead.
    async fn analyze_branch(&self, branch: &str, fallback_to_default: bool) -> ClientResult<Option<CloudAnalysis>> {
        let mut analyzed = Some(branch);
        let issues = match self.get_issues(Some(branch), &[]).await {
            Ok(issues) if !issues.is_empty() => issues,
            _ if fallback_to_default => {
                info!("Branch '{}' has no cloud analysis, reading the default branch", branch);
                analyzed = None;
                self.get_issues(None, &[]).await?
            }
            Ok(_) => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut report = FindingsReport::new(AnalysisSource::Cloud, issues);
        if let Ok(gate) = self.get_quality_gate_status(analyzed).await {
            report = report.with_quality_gate(gate);
        }
        if let Ok(metrics) = self.get_metrics(analyzed).await {
            report.metrics = metrics;
        }

        Ok(Some(CloudAnalysis {
            report,
            branch_analyzed: analyzed.map(str::to_string),
        }))
    }
}
