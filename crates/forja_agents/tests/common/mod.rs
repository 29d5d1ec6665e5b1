//! Shared harness and in-memory collaborators for the pipeline tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use forja_agents::{AgentServices, Pipeline};
use forja_clients::tracker::fields;
use forja_clients::{
    ClientError, ClientResult, Collaborators, CommitResult, FileChange, IssueTracker, MergeMethod,
    MergeResult, NewWorkItem, PullRequest, ReviewEvent, SourceControl, WorkItem, WorkItemQuery,
};
use forja_core::{ExecutionLog, RetryBudgets, Settings};
use forja_llm::ScriptedLlm;
use forja_runner::MockRunner;
use parking_lot::Mutex;
use serde_json::Value;
use tempfile::TempDir;

// ============================================================================
// In-memory collaborators
// ============================================================================

#[derive(Default)]
pub struct FakeTracker {
    items: Mutex<BTreeMap<u64, WorkItem>>,
    parents: Mutex<BTreeMap<u64, u64>>,
    events: Mutex<Vec<String>>,
}

impl FakeTracker {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn created(&self) -> usize {
        self.events().iter().filter(|e| e.starts_with("create")).count()
    }

    pub fn item(&self, id: u64) -> Option<WorkItem> {
        self.items.lock().get(&id).cloned()
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    fn name(&self) -> &str {
        "fake-tracker"
    }

    async fn create_work_item(&self, item: &NewWorkItem) -> ClientResult<WorkItem> {
        let mut items = self.items.lock();
        let id = items.len() as u64 + 100;
        let mut values = BTreeMap::new();
        values.insert(fields::TITLE.to_string(), Value::from(item.title.clone()));
        values.insert(fields::TAGS.to_string(), Value::from(item.tags.join("; ")));
        values.insert(fields::STATE.to_string(), Value::from("New"));
        values.insert(
            fields::WORK_ITEM_TYPE.to_string(),
            Value::from(item.item_type.as_str()),
        );
        let created = WorkItem {
            id,
            url: format!("https://tracker.test/{}", id),
            fields: values,
        };
        items.insert(id, created.clone());
        if let Some(parent) = item.parent_id {
            self.parents.lock().insert(id, parent);
        }
        self.events
            .lock()
            .push(format!("create {} #{}", item.item_type, id));
        Ok(created)
    }

    async fn update_work_item(
        &self,
        id: u64,
        updates: &[(&str, Value)],
        _comment: Option<&str>,
    ) -> ClientResult<WorkItem> {
        let mut items = self.items.lock();
        let item = items
            .get_mut(&id)
            .ok_or_else(|| ClientError::api("fake", 404, "no such item"))?;
        for (name, value) in updates {
            item.fields.insert(name.to_string(), value.clone());
            self.events.lock().push(format!("update #{} {}", id, name));
        }
        Ok(item.clone())
    }

    async fn get_child_work_items(&self, id: u64) -> ClientResult<Vec<WorkItem>> {
        let parents = self.parents.lock();
        let items = self.items.lock();
        Ok(parents
            .iter()
            .filter(|(_, parent)| **parent == id)
            .filter_map(|(child, _)| items.get(child).cloned())
            .collect())
    }

    async fn search_work_items(&self, query: &WorkItemQuery) -> ClientResult<Vec<WorkItem>> {
        Ok(self
            .items
            .lock()
            .values()
            .filter(|w| w.title().contains(&query.title_contains))
            .cloned()
            .collect())
    }

    async fn add_comment(&self, id: u64, _text: &str) -> ClientResult<()> {
        self.events.lock().push(format!("comment #{}", id));
        Ok(())
    }

    async fn attach_file(&self, id: u64, path: &Path, _comment: &str) -> ClientResult<()> {
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        self.events.lock().push(format!("attach #{} {}", id, name));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeScm {
    pub branches: Mutex<Vec<String>>,
    pub commits: Mutex<Vec<(String, Vec<String>)>>,
    pub prs: Mutex<Vec<PullRequest>>,
    pub reviews: Mutex<Vec<ReviewEvent>>,
    pub merged: Mutex<Vec<(u64, String)>>,
    pub deleted: Mutex<Vec<String>>,
    /// Answer every merge with `merged: false`.
    pub refuse_merge: bool,
    /// Refuse to create branches once this many exist.
    pub branch_limit: Option<usize>,
}

impl FakeScm {
    pub fn refusing_merges() -> Self {
        Self {
            refuse_merge: true,
            ..Default::default()
        }
    }

    pub fn with_branch_limit(limit: usize) -> Self {
        Self {
            branch_limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn merged_prs(&self) -> Vec<u64> {
        self.merged.lock().iter().map(|(pr, _)| *pr).collect()
    }
}

#[async_trait]
impl SourceControl for FakeScm {
    fn name(&self) -> &str {
        "fake-scm"
    }

    fn base_branch(&self) -> &str {
        "main"
    }

    async fn branch_sha(&self, branch: &str) -> ClientResult<String> {
        Ok(format!("sha-{}", branch))
    }

    async fn create_branch(&self, _base_sha: &str, name: &str) -> ClientResult<String> {
        let mut branches = self.branches.lock();
        if self.branch_limit.is_some_and(|limit| branches.len() >= limit) {
            return Err(ClientError::api("fake", 403, "Resource not accessible by integration"));
        }
        branches.push(name.to_string());
        Ok(format!("sha-{}", name))
    }

    async fn create_commit(
        &self,
        branch: &str,
        files: &[FileChange],
        _message: &str,
    ) -> ClientResult<CommitResult> {
        let mut commits = self.commits.lock();
        commits.push((branch.to_string(), files.iter().map(|f| f.path.clone()).collect()));
        Ok(CommitResult {
            sha: format!("commit-{}", commits.len()),
            branch: branch.to_string(),
        })
    }

    async fn create_pr(&self, branch: &str, title: &str, _body: &str) -> ClientResult<PullRequest> {
        let merged = self.merged_prs();
        let mut prs = self.prs.lock();
        if let Some(open) = prs
            .iter()
            .find(|pr| pr.head == branch && !merged.contains(&pr.number))
        {
            return Ok(open.clone());
        }
        let pr = PullRequest {
            number: prs.len() as u64 + 1,
            url: format!("https://scm.test/pull/{}", prs.len() + 1),
            title: title.to_string(),
            head: branch.to_string(),
        };
        prs.push(pr.clone());
        Ok(pr)
    }

    async fn create_review(&self, _pr: u64, event: ReviewEvent, _body: &str) -> ClientResult<ReviewEvent> {
        self.reviews.lock().push(event);
        Ok(event)
    }

    async fn add_pr_comment(&self, _pr: u64, _body: &str) -> ClientResult<()> {
        Ok(())
    }

    async fn is_mergeable(&self, _pr: u64) -> ClientResult<Option<bool>> {
        Ok(Some(true))
    }

    async fn merge_pr(
        &self,
        pr: u64,
        _method: MergeMethod,
        title: &str,
        _message: &str,
    ) -> ClientResult<MergeResult> {
        self.merged.lock().push((pr, title.to_string()));
        if self.refuse_merge {
            return Ok(MergeResult {
                merged: false,
                sha: None,
                message: "Required status check is failing".to_string(),
            });
        }
        Ok(MergeResult {
            merged: true,
            sha: Some("merge-sha".to_string()),
            message: "merged".to_string(),
        })
    }

    async fn delete_branch(&self, name: &str) -> ClientResult<()> {
        self.deleted.lock().push(name.to_string());
        Ok(())
    }

    async fn get_pr_files(&self, _pr: u64) -> ClientResult<Vec<String>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub temp: TempDir,
    pub llm: Arc<ScriptedLlm>,
    runner: MockRunner,
    budgets: RetryBudgets,
    collaborators: Collaborators,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
            llm: Arc::new(ScriptedLlm::new()),
            runner: MockRunner::new(),
            budgets: RetryBudgets::default(),
            collaborators: Collaborators::disabled(),
        }
    }

    pub fn budgets(mut self, budgets: RetryBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn runner(mut self, runner: MockRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn services(&self) -> Arc<AgentServices> {
        let settings = Settings::default()
            .with_output_dir(self.temp.path())
            .with_budgets(self.budgets);
        let services = AgentServices::new(
            settings,
            self.llm.clone(),
            Arc::new(self.runner.clone()),
        )
        .unwrap()
        .with_collaborators(self.collaborators.clone());
        Arc::new(services)
    }

    pub async fn run(&self, prompt: &str) -> ExecutionLog {
        Pipeline::new(self.services()).run(prompt, None).await.unwrap()
    }

    pub fn artifact(&self, name: &str) -> bool {
        self.temp.path().join(name).exists()
    }
}
