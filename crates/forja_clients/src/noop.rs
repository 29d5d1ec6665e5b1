//! Stand-ins for collaborators that are switched off.
//!
//! Every operation fails with [`ClientError::Disabled`], which callers treat
//! as "skip this side effect".

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use forja_policy::{Finding, QualityGateStatus};
use serde_json::Value;

use crate::error::{ClientError, ClientResult};
use crate::quality::CloudQuality;
use crate::scm::{CommitResult, FileChange, MergeMethod, MergeResult, PullRequest, ReviewEvent, SourceControl};
use crate::tracker::{IssueTracker, NewWorkItem, WorkItem, WorkItemQuery};

fn disabled<T>(name: &str) -> ClientResult<T> {
    Err(ClientError::Disabled(name.to_string()))
}

#[derive(Debug, Default, Clone)]
pub struct NoopTracker;

#[async_trait]
impl IssueTracker for NoopTracker {
    fn name(&self) -> &str {
        "noop_tracker"
    }

    async fn create_work_item(&self, _item: &NewWorkItem) -> ClientResult<WorkItem> {
        disabled("issue tracker")
    }

    async fn update_work_item(
        &self,
        _id: u64,
        _fields: &[(&str, Value)],
        _comment: Option<&str>,
    ) -> ClientResult<WorkItem> {
        disabled("issue tracker")
    }

    async fn get_child_work_items(&self, _id: u64) -> ClientResult<Vec<WorkItem>> {
        disabled("issue tracker")
    }

    async fn search_work_items(&self, _query: &WorkItemQuery) -> ClientResult<Vec<WorkItem>> {
        disabled("issue tracker")
    }

    async fn add_comment(&self, _id: u64, _text: &str) -> ClientResult<()> {
        disabled("issue tracker")
    }

    async fn attach_file(&self, _id: u64, _path: &Path, _comment: &str) -> ClientResult<()> {
        disabled("issue tracker")
    }
}

#[derive(Debug, Clone)]
pub struct NoopSourceControl {
    base_branch: String,
}

impl NoopSourceControl {
    pub fn new(base_branch: impl Into<String>) -> Self {
        Self {
            base_branch: base_branch.into(),
        }
    }
}

impl Default for NoopSourceControl {
    fn default() -> Self {
        Self::new("main")
    }
}

#[async_trait]
impl SourceControl for NoopSourceControl {
    fn name(&self) -> &str {
        "noop_scm"
    }

    fn base_branch(&self) -> &str {
        &self.base_branch
    }

    async fn branch_sha(&self, _branch: &str) -> ClientResult<String> {
        disabled("source control")
    }

    async fn create_branch(&self, _base_sha: &str, _name: &str) -> ClientResult<String> {
        disabled("source control")
    }

    async fn create_commit(
        &self,
        _branch: &str,
        _files: &[FileChange],
        _message: &str,
    ) -> ClientResult<CommitResult> {
        disabled("source control")
    }

    async fn create_pr(&self, _branch: &str, _title: &str, _body: &str) -> ClientResult<PullRequest> {
        disabled("source control")
    }

    async fn create_review(&self, _pr: u64, _event: ReviewEvent, _body: &str) -> ClientResult<ReviewEvent> {
        disabled("source control")
    }

    async fn add_pr_comment(&self, _pr: u64, _body: &str) -> ClientResult<()> {
        disabled("source control")
    }

    async fn is_mergeable(&self, _pr: u64) -> ClientResult<Option<bool>> {
        disabled("source control")
    }

    async fn merge_pr(
        &self,
        _pr: u64,
        _method: MergeMethod,
        _title: &str,
        _message: &str,
    ) -> ClientResult<MergeResult> {
        disabled("source control")
    }

    async fn delete_branch(&self, _name: &str) -> ClientResult<()> {
        disabled("source control")
    }

    async fn get_pr_files(&self, _pr: u64) -> ClientResult<Vec<String>> {
        disabled("source control")
    }
}

#[derive(Debug, Default, Clone)]
pub struct NoopCloudQuality;

#[async_trait]
impl CloudQuality for NoopCloudQuality {
    fn name(&self) -> &str {
        "noop_quality"
    }

    async fn verify_project(&self) -> ClientResult<()> {
        disabled("cloud quality")
    }

    async fn list_branches(&self) -> ClientResult<Vec<String>> {
        disabled("cloud quality")
    }

    async fn get_issues(&self, _branch: Option<&str>, _severities: &[&str]) -> ClientResult<Vec<Finding>> {
        disabled("cloud quality")
    }

    async fn get_quality_gate_status(&self, _branch: Option<&str>) -> ClientResult<QualityGateStatus> {
        disabled("cloud quality")
    }

    async fn get_metrics(&self, _branch: Option<&str>) -> ClientResult<BTreeMap<String, String>> {
        disabled("cloud quality")
    }
}
