//! The common findings record produced by both analysis sources.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Severity of a finding, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Blocker,
    Critical,
    Major,
    Minor,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Blocker,
        Severity::Critical,
        Severity::Major,
        Severity::Minor,
        Severity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Blocker => "BLOCKER",
            Severity::Critical => "CRITICAL",
            Severity::Major => "MAJOR",
            Severity::Minor => "MINOR",
            Severity::Info => "INFO",
        }
    }

    /// Parse a service label; unknown labels are treated as `INFO`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "BLOCKER" => Severity::Blocker,
            "CRITICAL" => Severity::Critical,
            "MAJOR" => Severity::Major,
            "MINOR" => Severity::Minor,
            _ => Severity::Info,
        }
    }

    /// BLOCKER or CRITICAL.
    pub fn is_critical(&self) -> bool {
        matches!(self, Severity::Blocker | Severity::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    Bug,
    Vulnerability,
    CodeSmell,
    SecurityHotspot,
}

impl IssueType {
    pub const ALL: [IssueType; 4] = [
        IssueType::Bug,
        IssueType::Vulnerability,
        IssueType::CodeSmell,
        IssueType::SecurityHotspot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Bug => "BUG",
            IssueType::Vulnerability => "VULNERABILITY",
            IssueType::CodeSmell => "CODE_SMELL",
            IssueType::SecurityHotspot => "SECURITY_HOTSPOT",
        }
    }

    /// Parse a service label; unknown labels are treated as `CODE_SMELL`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "BUG" => IssueType::Bug,
            "VULNERABILITY" => IssueType::Vulnerability,
            "SECURITY_HOTSPOT" => IssueType::SecurityHotspot,
            _ => IssueType::CodeSmell,
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single issue reported by an analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule: String,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub message: String,
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

impl Finding {
    pub fn new(
        rule: impl Into<String>,
        severity: Severity,
        issue_type: IssueType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule: rule.into(),
            severity,
            issue_type,
            message: message.into(),
            line: None,
            component: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn in_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }
}

/// Counts by severity and by type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_type: BTreeMap<IssueType, usize>,
}

impl Summary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = Self {
            total: findings.len(),
            by_severity: Severity::ALL.iter().map(|s| (*s, 0)).collect(),
            by_type: IssueType::ALL.iter().map(|t| (*t, 0)).collect(),
        };
        for finding in findings {
            *summary.by_severity.entry(finding.severity).or_default() += 1;
            *summary.by_type.entry(finding.issue_type).or_default() += 1;
        }
        summary
    }

    pub fn severity(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }

    pub fn of_type(&self, issue_type: IssueType) -> usize {
        self.by_type.get(&issue_type).copied().unwrap_or(0)
    }
}

/// Where a findings record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    Local,
    Cloud,
}

impl AnalysisSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisSource::Local => "local",
            AnalysisSource::Cloud => "cloud",
        }
    }
}

impl std::fmt::Display for AnalysisSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quality-gate status as reported by the cloud service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGateStatus {
    /// `OK`, `WARN`, `ERROR` or `NONE`.
    pub status: String,
    #[serde(default)]
    pub failed_conditions: Vec<String>,
}

impl QualityGateStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            failed_conditions: Vec::new(),
        }
    }

    /// The explicit verdict, if the service computed one.
    pub fn verdict(&self) -> Option<bool> {
        match self.status.to_uppercase().as_str() {
            "OK" | "WARN" => Some(true),
            "ERROR" => Some(false),
            _ => None,
        }
    }
}

/// Result of one static analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingsReport {
    pub source: AnalysisSource,
    pub issues: Vec<Finding>,
    pub summary: Summary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_gate: Option<QualityGateStatus>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, String>,
}

impl FindingsReport {
    pub fn new(source: AnalysisSource, issues: Vec<Finding>) -> Self {
        let summary = Summary::from_findings(&issues);
        Self {
            source,
            issues,
            summary,
            quality_gate: None,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_quality_gate(mut self, status: QualityGateStatus) -> Self {
        self.quality_gate = Some(status);
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    /// BLOCKER and CRITICAL findings, in report order.
    pub fn critical_issues(&self) -> Vec<&Finding> {
        self.issues.iter().filter(|f| f.severity.is_critical()).collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let findings = vec![
            Finding::new("python:S6437", Severity::Blocker, IssueType::Vulnerability, "cred"),
            Finding::new("python:S106", Severity::Minor, IssueType::CodeSmell, "print"),
            Finding::new("python:S103", Severity::Minor, IssueType::CodeSmell, "long"),
        ];
        let summary = Summary::from_findings(&findings);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.severity(Severity::Blocker), 1);
        assert_eq!(summary.severity(Severity::Minor), 2);
        assert_eq!(summary.severity(Severity::Critical), 0);
        assert_eq!(summary.of_type(IssueType::CodeSmell), 2);
        assert_eq!(summary.of_type(IssueType::Bug), 0);
    }

    #[test]
    fn test_labels_parse() {
        assert_eq!(Severity::parse("critical"), Severity::Critical);
        assert_eq!(Severity::parse("???"), Severity::Info);
        assert_eq!(IssueType::parse("SECURITY_HOTSPOT"), IssueType::SecurityHotspot);
        assert_eq!(IssueType::parse(""), IssueType::CodeSmell);
    }

    #[test]
    fn test_quality_gate_verdict() {
        assert_eq!(QualityGateStatus::new("OK").verdict(), Some(true));
        assert_eq!(QualityGateStatus::new("ERROR").verdict(), Some(false));
        assert_eq!(QualityGateStatus::new("NONE").verdict(), None);
    }

    #[test]
    fn test_report_json_shape() {
        let report = FindingsReport::new(
            AnalysisSource::Local,
            vec![Finding::new("typescript:S2737", Severity::Critical, IssueType::Bug, "empty catch").at_line(4)],
        );
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["issues"][0]["severity"], "CRITICAL");
        assert_eq!(value["issues"][0]["type"], "BUG");
        assert_eq!(value["summary"]["by_severity"]["CRITICAL"], 1);
        assert!(value.get("quality_gate").is_none());
    }
}
