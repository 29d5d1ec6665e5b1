//! Plain-text rendering of a findings record.

use crate::findings::{Finding, FindingsReport, IssueType, Severity};
use crate::gate::GateResult;

/// Every issue is listed when the report has at most this many.
pub const FULL_LISTING_LIMIT: usize = 10;

const RULE: &str = "============================================================";

/// Render the report persisted by the quality gate.
pub fn format_report(report: &FindingsReport, gate: &GateResult) -> String {
    let summary = &report.summary;
    let mut out = vec![
        RULE.to_string(),
        "REPORTE DE ANÁLISIS DE CALIDAD".to_string(),
        RULE.to_string(),
        format!("Fuente: {}", report.source),
        format!("Total de issues: {}", summary.total),
        String::new(),
        "Por severidad:".to_string(),
    ];
    for severity in Severity::ALL {
        out.push(format!("   {:<9} {}", format!("{}:", severity), summary.severity(severity)));
    }
    out.push(String::new());
    out.push("Por tipo:".to_string());
    for issue_type in IssueType::ALL {
        out.push(format!("   {:<17} {}", format!("{}:", issue_type), summary.of_type(issue_type)));
    }

    if let Some(status) = &report.quality_gate {
        out.push(String::new());
        out.push(format!("Quality gate del servicio: {}", status.status));
        for condition in &status.failed_conditions {
            out.push(format!("   - {}", condition));
        }
    }
    if !report.metrics.is_empty() {
        out.push(String::new());
        out.push("Métricas:".to_string());
        for (key, value) in &report.metrics {
            out.push(format!("   {}: {}", key, value));
        }
    }

    let critical = report.critical_issues();
    if !critical.is_empty() {
        out.push(String::new());
        out.push(RULE.to_string());
        out.push("ISSUES CRÍTICOS Y BLOQUEANTES:".to_string());
        out.push(RULE.to_string());
        for finding in &critical {
            out.push(String::new());
            out.push(issue_heading(finding));
            out.push(format!("Regla: {}", finding.rule));
            out.push(format!("Tipo: {}", finding.issue_type));
            out.push(format!("Mensaje: {}", finding.message));
        }
    }

    let rest: Vec<&Finding> = report.issues.iter().filter(|f| !f.severity.is_critical()).collect();
    if report.issues.len() <= FULL_LISTING_LIMIT && !rest.is_empty() {
        out.push(String::new());
        out.push(RULE.to_string());
        out.push("RESTO DE ISSUES:".to_string());
        out.push(RULE.to_string());
        for finding in rest {
            out.push(String::new());
            out.push(issue_heading(finding));
            out.push(format!("Mensaje: {}", finding.message));
        }
    }

    out.push(String::new());
    out.push(RULE.to_string());
    out.push(gate.verdict_line());
    out.push(RULE.to_string());
    out.join("\n")
}

fn issue_heading(finding: &Finding) -> String {
    let line = finding
        .line
        .map_or_else(|| "N/A".to_string(), |l| l.to_string());
    match &finding.component {
        Some(component) => format!("[{}] {} línea {}", finding.severity, component, line),
        None => format!("[{}] Línea {}", finding.severity, line),
    }
}

/// Short bullet list of the most severe issues, for tracker comments.
pub fn issue_bullets(report: &FindingsReport, limit: usize) -> Vec<String> {
    let mut ordered: Vec<&Finding> = report.issues.iter().collect();
    ordered.sort_by_key(|f| f.severity);
    ordered
        .into_iter()
        .take(limit)
        .map(|f| {
            let line = f.line.map_or_else(String::new, |l| format!(" (línea {})", l));
            format!("[{}] {}{}: {}", f.severity, f.rule, line, f.message)
        })
        .collect()
}
