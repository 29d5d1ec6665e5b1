//! Source-control host interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;

/// An open pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub title: String,
    /// Head branch name.
    pub head: String,
}

/// A file to commit, path relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub content: String,
}

impl FileChange {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub sha: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub merged: bool,
    pub sha: Option<String>,
    pub message: String,
}

/// Event of a PR review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewEvent {
    Approve,
    Comment,
    RequestChanges,
}

impl ReviewEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewEvent::Approve => "APPROVE",
            ReviewEvent::Comment => "COMMENT",
            ReviewEvent::RequestChanges => "REQUEST_CHANGES",
        }
    }
}

impl std::fmt::Display for ReviewEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    Merge,
    #[default]
    Squash,
    Rebase,
}

impl MergeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        }
    }
}

impl std::fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Git ref and pull-request operations on a hosted repository.
#[async_trait]
pub trait SourceControl: Send + Sync {
    fn name(&self) -> &str;

    /// Branch new work is opened from and merged into.
    fn base_branch(&self) -> &str;

    /// Head commit of `branch`.
    async fn branch_sha(&self, branch: &str) -> ClientResult<String>;

    /// Create `name` at `base_sha`. An existing branch is kept and its head returned.
    async fn create_branch(&self, base_sha: &str, name: &str) -> ClientResult<String>;

    /// Commit `files` on top of `branch` and move the branch to the new commit.
    async fn create_commit(
        &self,
        branch: &str,
        files: &[FileChange],
        message: &str,
    ) -> ClientResult<CommitResult>;

    /// Open a PR from `branch`, or return the open one it already has.
    async fn create_pr(&self, branch: &str, title: &str, body: &str) -> ClientResult<PullRequest>;

    /// Post a review. Returns the event actually recorded, which can differ
    /// when the host refuses an approval.
    async fn create_review(&self, pr: u64, event: ReviewEvent, body: &str) -> ClientResult<ReviewEvent>;

    async fn add_pr_comment(&self, pr: u64, body: &str) -> ClientResult<()>;

    /// Mergeability flag; `None` while the host is still computing it.
    async fn is_mergeable(&self, pr: u64) -> ClientResult<Option<bool>>;

    async fn merge_pr(
        &self,
        pr: u64,
        method: MergeMethod,
        title: &str,
        message: &str,
    ) -> ClientResult<MergeResult>;

    async fn delete_branch(&self, name: &str) -> ClientResult<()>;

    /// Paths changed by the PR.
    async fn get_pr_files(&self, pr: u64) -> ClientResult<Vec<String>>;

    /// Create `name` off the base branch.
    async fn open_branch(&self, name: &str) -> ClientResult<String> {
        let base_sha = self.branch_sha(self.base_branch()).await?;
        self.create_branch(&base_sha, name).await
    }
}
