//! Issue-tracker model and trait.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientResult;

/// Tag put on every work item the pipeline creates.
pub const AI_TAG: &str = "AI-Generated";

/// Work item kinds used by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkItemType {
    ProductBacklogItem,
    Task,
    Bug,
}

impl WorkItemType {
    /// Name as the tracker spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemType::ProductBacklogItem => "Product Backlog Item",
            WorkItemType::Task => "Task",
            WorkItemType::Bug => "Bug",
        }
    }
}

impl std::fmt::Display for WorkItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// States a work item moves through.
pub mod states {
    pub const IN_PROGRESS: &str = "In Progress";
    pub const DONE: &str = "Done";
}

/// Well-known field reference names.
pub mod fields {
    pub const TITLE: &str = "System.Title";
    pub const DESCRIPTION: &str = "System.Description";
    pub const STATE: &str = "System.State";
    pub const TAGS: &str = "System.Tags";
    pub const HISTORY: &str = "System.History";
    pub const WORK_ITEM_TYPE: &str = "System.WorkItemType";
    pub const AREA_PATH: &str = "System.AreaPath";
    pub const ITERATION_PATH: &str = "System.IterationPath";
    pub const ASSIGNED_TO: &str = "System.AssignedTo";
    pub const ACCEPTANCE_CRITERIA: &str = "Microsoft.VSTS.Common.AcceptanceCriteria";
    pub const PRIORITY: &str = "Microsoft.VSTS.Common.Priority";
    pub const STORY_POINTS: &str = "Microsoft.VSTS.Scheduling.StoryPoints";
    pub const REMAINING_WORK: &str = "Microsoft.VSTS.Scheduling.RemainingWork";
}

/// A work item as returned by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: u64,
    /// Browser URL
    pub url: String,
    pub fields: BTreeMap<String, Value>,
}

impl WorkItem {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }

    pub fn title(&self) -> &str {
        self.field(fields::TITLE).unwrap_or_default()
    }

    pub fn state(&self) -> Option<&str> {
        self.field(fields::STATE)
    }

    pub fn work_item_type(&self) -> Option<&str> {
        self.field(fields::WORK_ITEM_TYPE)
    }

    /// Tags split on the tracker's `;` separator.
    pub fn tags(&self) -> Vec<String> {
        self.field(fields::TAGS)
            .map(|t| {
                t.split(';')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// A work item to create.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkItem {
    pub item_type: WorkItemType,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Option<String>,
    pub story_points: Option<u32>,
    pub remaining_work: Option<u32>,
    pub priority: Option<u32>,
    pub tags: Vec<String>,
    pub parent_id: Option<u64>,
    /// Extra fields by reference name
    pub extra_fields: BTreeMap<String, Value>,
}

impl NewWorkItem {
    pub fn new(item_type: WorkItemType, title: impl Into<String>) -> Self {
        Self {
            item_type,
            title: title.into(),
            description: String::new(),
            acceptance_criteria: None,
            story_points: None,
            remaining_work: None,
            priority: None,
            tags: Vec::new(),
            parent_id: None,
            extra_fields: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_acceptance_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.acceptance_criteria = Some(criteria.into());
        self
    }

    pub fn with_story_points(mut self, points: u32) -> Self {
        self.story_points = Some(points);
        self
    }

    pub fn with_remaining_work(mut self, hours: u32) -> Self {
        self.remaining_work = Some(hours);
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_parent(mut self, parent_id: u64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_fields.insert(name.into(), value.into());
        self
    }
}

/// Criteria for [`IssueTracker::search_work_items`].
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItemQuery {
    pub title_contains: String,
    pub item_type: Option<WorkItemType>,
    pub tags: Vec<String>,
    pub max_results: usize,
}

impl WorkItemQuery {
    pub fn title_contains(text: impl Into<String>) -> Self {
        Self {
            title_contains: text.into(),
            item_type: None,
            tags: Vec::new(),
            max_results: 5,
        }
    }

    pub fn of_type(mut self, item_type: WorkItemType) -> Self {
        self.item_type = Some(item_type);
        self
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn limit(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

/// Work-item tracker operations used by the agents.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn create_work_item(&self, item: &NewWorkItem) -> ClientResult<WorkItem>;

    /// Set fields by reference name; `comment` is appended to the history.
    async fn update_work_item(
        &self,
        id: u64,
        fields: &[(&str, Value)],
        comment: Option<&str>,
    ) -> ClientResult<WorkItem>;

    async fn get_child_work_items(&self, id: u64) -> ClientResult<Vec<WorkItem>>;

    async fn search_work_items(&self, query: &WorkItemQuery) -> ClientResult<Vec<WorkItem>>;

    async fn add_comment(&self, id: u64, text: &str) -> ClientResult<()>;

    /// Upload a file and link it to the work item.
    async fn attach_file(&self, id: u64, path: &Path, comment: &str) -> ClientResult<()>;

    /// Move a work item to `state`, optionally with a comment.
    async fn set_state(&self, id: u64, state: &str, comment: Option<&str>) -> ClientResult<WorkItem> {
        self.update_work_item(id, &[(fields::STATE, Value::String(state.to_string()))], comment)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(tags: &str) -> WorkItem {
        let mut map = BTreeMap::new();
        map.insert(fields::TITLE.to_string(), json!("[AI-Generated] Sumar"));
        map.insert(fields::TAGS.to_string(), json!(tags));
        WorkItem {
            id: 7,
            url: "https://dev.azure.com/org/proj/_workitems/edit/7".to_string(),
            fields: map,
        }
    }

    #[test]
    fn test_tags_split() {
        let wi = item("AI-Generated; Multiagente;Python");
        assert_eq!(wi.tags(), vec!["AI-Generated", "Multiagente", "Python"]);
        assert!(wi.has_tag("ai-generated"));
        assert!(!wi.has_tag("Testing"));
        assert_eq!(wi.title(), "[AI-Generated] Sumar");
        assert!(wi.state().is_none());
    }

    #[test]
    fn test_new_work_item_builder() {
        let task = NewWorkItem::new(WorkItemType::Task, "[AI-Generated] Implementar sumar")
            .with_parent(12)
            .with_tag(AI_TAG)
            .with_tag("Implementation")
            .with_remaining_work(4)
            .with_field("Custom.CIR", "No");
        assert_eq!(task.parent_id, Some(12));
        assert_eq!(task.tags.len(), 2);
        assert_eq!(task.extra_fields["Custom.CIR"], json!("No"));
    }

    #[test]
    fn test_query_defaults() {
        let q = WorkItemQuery::title_contains("Sumar").tagged(AI_TAG);
        assert_eq!(q.max_results, 5);
        assert!(q.item_type.is_none());
        assert_eq!(q.of_type(WorkItemType::ProductBacklogItem).item_type.unwrap().as_str(), "Product Backlog Item");
    }
}
