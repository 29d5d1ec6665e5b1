//! Merge: squash-merges the reviewed pull request and cleans up after it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forja_clients::MergeMethod;
use forja_core::requirements::base_name_or_default;
use forja_core::{
    names, CoreResult, FormalRequirements, MergeOutcome, Node, NodeId, StateDelta, WorkflowState,
};
use tracing::{debug, info, warn};

use crate::error::AgentResult;
use crate::services::{soft, soft_result, AgentServices};
use crate::tracking::display_title;

/// Mergeability checks before merging anyway.
const MERGEABLE_POLLS: u32 = 5;
const MERGEABLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct Merge {
    services: Arc<AgentServices>,
}

impl Merge {
    pub fn new(services: Arc<AgentServices>) -> Self {
        Self { services }
    }

    fn skip_reason(&self, state: &WorkflowState) -> Option<&'static str> {
        if self.services.mock_mode() {
            Some("modo mock activo")
        } else if state.pr_number.is_none() {
            Some("no hay pull request abierta")
        } else {
            None
        }
    }

    /// Poll the mergeability flag; `Err` carries the reason it can never merge.
    async fn wait_mergeable(&self, pr: u64) -> Result<(), String> {
        let scm = &self.services.collaborators.scm;
        for poll in 1..=MERGEABLE_POLLS {
            match scm.is_mergeable(pr).await {
                Ok(Some(true)) => return Ok(()),
                Ok(Some(false)) => return Err(format!("la PR #{} tiene conflictos", pr)),
                Ok(None) => debug!("PR #{} mergeability pending ({}/{})", pr, poll, MERGEABLE_POLLS),
                Err(e) => {
                    warn!("Could not read mergeability of PR #{}: {}", pr, e);
                    return Ok(());
                }
            }
            if poll < MERGEABLE_POLLS {
                tokio::time::sleep(MERGEABLE_POLL_INTERVAL).await;
            }
        }
        info!("PR #{} mergeability still unknown, merging anyway", pr);
        Ok(())
    }

    fn remove_local(path: &Path) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }

    async fn cleanup(&self, state: &WorkflowState, delta: &mut StateDelta) {
        let collaborators = &self.services.collaborators;
        if let Some(branch) = &state.branch_name {
            if soft("delete remote branch", collaborators.scm.delete_branch(branch))
                .await
                .is_some()
            {
                info!("Deleted remote branch {}", branch);
            }
            if let Some(git) = &collaborators.local_git {
                soft_result(
                    "delete local branch",
                    git.cleanup_branch(branch, collaborators.scm.base_branch()),
                );
            }
        }

        for path in [&state.local_code_path, &state.local_test_path].into_iter().flatten() {
            Self::remove_local(path);
        }
        delta.local_code_path = Some(None);
        delta.local_test_path = Some(None);
        // The merged PR is closed; the next iteration must not review or merge it again.
        delta.branch_name = Some(None);
        delta.pr_number = Some(None);
        delta.pr_url = Some(None);
    }

    async fn execute(&self, state: &WorkflowState) -> AgentResult<StateDelta> {
        let iteration = state.iteration();
        let branch = state.branch_name.as_deref().unwrap_or("-");

        let pr = match (self.skip_reason(state), state.pr_number) {
            (None, Some(pr)) => pr,
            (reason, _) => {
                let reason = reason.unwrap_or("no hay pull request abierta");
                info!("Merge skipped: {}", reason);
                self.services.save(
                    &names::merge(iteration, MergeOutcome::Skipped),
                    &format!("Estado: OMITIDO\nMotivo: {}\nBranch: {}", reason, branch),
                );
                return Ok(StateDelta {
                    pr_merged: Some(true),
                    ..Default::default()
                });
            }
        };

        if !(state.tests_passed && state.code_reviewed) {
            warn!("PR #{} reached merge without passing tests and review", pr);
            self.services.save(
                &names::merge(iteration, MergeOutcome::Failed),
                &format!(
                    "Estado: FAILED\nPR: #{}\nBranch: {}\nMotivo: pruebas o revisión sin superar",
                    pr, branch
                ),
            );
            return Ok(StateDelta {
                pr_merged: Some(false),
                ..Default::default()
            });
        }

        let failed = |reason: String| {
            warn!("Merge of PR #{} failed: {}", pr, reason);
            self.services.save(
                &names::merge(iteration, MergeOutcome::Failed),
                &format!("Estado: FAILED\nPR: #{}\nBranch: {}\nMotivo: {}", pr, branch, reason),
            );
            StateDelta {
                pr_merged: Some(false),
                ..Default::default()
            }
        };

        if let Err(reason) = self.wait_mergeable(pr).await {
            return Ok(failed(reason));
        }

        let record = FormalRequirements::from_json(&state.formal_requirements).ok();
        let title = format!(
            "chore: squash merge PR #{} - {}",
            pr,
            display_title(record.as_ref(), &base_name_or_default(&state.formal_requirements))
        );
        let message = format!(
            "Tests: {}\nRevisión: {}/10",
            state.test_summary.trim(),
            state.review_score.map_or("-".to_string(), |s| s.to_string())
        );

        let result = self
            .services
            .collaborators
            .scm
            .merge_pr(pr, MergeMethod::Squash, &title, &message)
            .await;
        match result {
            Ok(merge) if merge.merged => {
                info!("Merged PR #{} ({})", pr, merge.sha.as_deref().unwrap_or("-"));
                let mut delta = StateDelta {
                    pr_merged: Some(true),
                    ..Default::default()
                };
                self.cleanup(state, &mut delta).await;
                self.services.save(
                    &names::merge(iteration, MergeOutcome::Merged),
                    &format!(
                        "Estado: MERGED\nPR: #{}\nBranch: {}\nMétodo: {}\nCommit: {}",
                        pr,
                        branch,
                        MergeMethod::Squash,
                        merge.sha.as_deref().unwrap_or("-")
                    ),
                );
                Ok(delta)
            }
            Ok(merge) => Ok(failed(merge.message)),
            Err(e) => Ok(failed(e.to_string())),
        }
    }
}

#[async_trait]
impl Node for Merge {
    fn id(&self) -> NodeId {
        NodeId::Merge
    }

    fn description(&self) -> &str {
        "Squash-merges the reviewed pull request"
    }

    async fn run(&self, state: &WorkflowState) -> CoreResult<StateDelta> {
        self.execute(state).await.map_err(|e| e.into_core(self.id()))
    }
}
