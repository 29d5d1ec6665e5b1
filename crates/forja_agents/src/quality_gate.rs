//! Quality gate: static analysis of the generated code.
//!
//! The cloud service is polled on the iteration branch when it is enabled;
//! otherwise, or when it never answers, the local analyzer runs. The
//! acceptance rule decides unless the service reports its own verdict.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use forja_clients::states;
use forja_core::requirements::base_name_or_default;
use forja_core::{names, strip_code_fences, CoreResult, Node, NodeId, StateDelta, WorkflowState};
use forja_llm::{LlmRequest, Role};
use forja_policy::{format_report, issue_bullets, FindingsReport, GateResult};
use tracing::{debug, info, warn};

use crate::error::AgentResult;
use crate::services::{soft, AgentServices};

/// Waits between cloud polls; the last value repeats.
const POLL_INTERVALS_SECS: [u64; 5] = [5, 10, 15, 20, 30];

/// Issues listed in a tracker comment.
const COMMENT_ISSUES: usize = 5;

/// Waits between cloud polls whose total stays within `timeout`.
pub fn poll_schedule(timeout: Duration) -> Vec<Duration> {
    let mut schedule = Vec::new();
    let mut total = Duration::ZERO;
    let mut index = 0;
    loop {
        let secs = POLL_INTERVALS_SECS[index.min(POLL_INTERVALS_SECS.len() - 1)];
        let wait = Duration::from_secs(secs);
        if total + wait > timeout {
            return schedule;
        }
        total += wait;
        schedule.push(wait);
        index += 1;
    }
}

pub struct QualityGate {
    services: Arc<AgentServices>,
    cloud_verified: AtomicBool,
}

impl QualityGate {
    pub fn new(services: Arc<AgentServices>) -> Self {
        Self {
            services,
            cloud_verified: AtomicBool::new(false),
        }
    }

    /// Findings of the branch from the cloud service, if it has any.
    async fn cloud_report(&self, branch: &str) -> Option<FindingsReport> {
        let quality = &self.services.collaborators.quality;

        if !self.cloud_verified.load(Ordering::Relaxed) {
            soft("reach the cloud quality project", quality.verify_project()).await?;
            if let Some(branches) = soft("list analyzed branches", quality.list_branches()).await {
                debug!("Cloud project has {} analyzed branch(es)", branches.len());
            }
            self.cloud_verified.store(true, Ordering::Relaxed);
        }

        let timeout = self.services.settings.timeouts.cloud_analysis();
        let started = Instant::now();
        let mut waits = poll_schedule(timeout).into_iter();
        loop {
            match quality.analyze_branch(branch, false).await {
                Ok(Some(analysis)) => {
                    info!(
                        "Cloud analysis of {}: {} issue(s)",
                        branch,
                        analysis.report.summary.total
                    );
                    return Some(analysis.report);
                }
                Ok(None) => debug!("No cloud analysis for {} yet", branch),
                Err(e) => {
                    warn!("Cloud analysis of {} failed: {}", branch, e);
                    break;
                }
            }
            match waits.next() {
                Some(wait) => {
                    info!(
                        "Waiting {}s for the cloud analysis ({}s elapsed)",
                        wait.as_secs(),
                        started.elapsed().as_secs()
                    );
                    tokio::time::sleep(wait).await;
                }
                None => break,
            }
        }

        let analysis = soft("read the default-branch analysis", quality.analyze_branch(branch, true))
            .await
            .flatten()?;
        if analysis.used_default_branch() {
            warn!("Using the default-branch analysis for {}", branch);
        }
        Some(analysis.report)
    }

    fn local_report(&self, state: &WorkflowState) -> FindingsReport {
        let language = state.language();
        let component = language.source_file_name(&base_name_or_default(&state.formal_requirements));
        self.services.analyzer.analyze(
            &strip_code_fences(&state.generated_code),
            language,
            Some(&component),
        )
    }

    async fn correction_instructions(&self, state: &WorkflowState, report_text: &str) -> AgentResult<String> {
        let language = state.language();
        let context = format!(
            "Código analizado:\n```{}\n{}\n```\n\nInforme de análisis estático:\n{}",
            language.fence_tag(),
            strip_code_fences(&state.generated_code),
            report_text
        );
        let answer = self
            .services
            .ask(LlmRequest::new(Role::QualityAnalyst, context))
            .await?;
        Ok(answer.trim().to_string())
    }

    async fn notify(&self, state: &WorkflowState, report: &FindingsReport, gate: &GateResult) {
        let Some(task_id) = state.implementation_task_id else {
            return;
        };
        let tracker = &self.services.collaborators.tracker;

        if state.is_first_pass() {
            soft(
                "move implementation task to In Progress",
                tracker.set_state(task_id, states::IN_PROGRESS, None),
            )
            .await;
        }

        let comment = if gate.passed {
            format!(
                "✅ Análisis de calidad aprobado ({}, {} issue(s)).",
                report.source.as_str(),
                report.summary.total
            )
        } else {
            let bullets = issue_bullets(report, COMMENT_ISSUES)
                .into_iter()
                .map(|b| format!("<li>{}</li>", b))
                .collect::<Vec<_>>()
                .join("");
            format!(
                "❌ Análisis de calidad rechazado (intento {}/{}).<ul>{}</ul>",
                state.counters.quality.next(),
                state.counters.quality.max,
                bullets
            )
        };
        soft("comment on implementation task", tracker.add_comment(task_id, &comment)).await;
    }

    async fn execute(&self, state: &WorkflowState) -> AgentResult<StateDelta> {
        let iteration = state.iteration();
        let quality_count = state.counters.quality.count;

        let cloud = match &state.branch_name {
            Some(branch) => self.cloud_report(branch).await,
            None => None,
        };
        let report = match cloud {
            Some(report) => report,
            None => self.local_report(state),
        };

        let gate = self.services.rule.evaluate(&report);
        let report_text = format_report(&report, &gate);
        self.services
            .save(&names::quality_report(iteration, quality_count), &report_text);
        info!("{}", gate.verdict_line());

        let delta = if gate.passed {
            StateDelta {
                quality_passed: Some(true),
                quality_issues: Some(String::new()),
                quality_attempt_count: Some(0),
                ..Default::default()
            }
        } else {
            let instructions = self.correction_instructions(state, &report_text).await?;
            self.services.save(
                &names::quality_instructions(iteration, quality_count),
                &instructions,
            );
            StateDelta {
                quality_passed: Some(false),
                quality_issues: Some(instructions),
                quality_attempt_count: Some(state.counters.quality.next()),
                ..Default::default()
            }
        };

        self.notify(state, &report, &gate).await;
        Ok(delta)
    }
}

#[async_trait]
impl Node for QualityGate {
    fn id(&self) -> NodeId {
        NodeId::QualityGate
    }

    fn description(&self) -> &str {
        "Runs static analysis and applies the acceptance rule"
    }

    async fn run(&self, state: &WorkflowState) -> CoreResult<StateDelta> {
        self.execute(state).await.map_err(|e| e.into_core(self.id()))
    }
}
