//! Azure DevOps work-item client.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use forja_core::TrackerSettings;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};
use crate::http::{self, DEFAULT_TIMEOUT};
use crate::tracker::{fields, IssueTracker, NewWorkItem, WorkItem, WorkItemQuery, WorkItemType};

const SERVICE: &str = "azure_devops";
const API_VERSION: &str = "7.0";
const CHILD_RELATION: &str = "System.LinkTypes.Hierarchy-Forward";
const PARENT_RELATION: &str = "System.LinkTypes.Hierarchy-Reverse";
const MAX_TITLE_LEN: usize = 255;

/// Values written into the project's required custom fields on PBI creation.
const DEFAULT_NATURE: &str = "3. Technical Debt";
const DEFAULT_CIR: &str = "No";

/// Azure DevOps REST client authenticated with a personal access token.
pub struct AzureDevOpsClient {
    base_url: String,
    project: String,
    pat: String,
    area_path: Option<String>,
    iteration_path: Option<String>,
    assigned_to: Option<String>,
    nature_field: String,
    cir_field: String,
    client: Client,
}

impl AzureDevOpsClient {
    pub fn from_settings(settings: &TrackerSettings) -> ClientResult<Self> {
        Ok(Self {
            base_url: format!("https://dev.azure.com/{}", settings.organization),
            project: settings.project.clone(),
            pat: settings.pat.clone(),
            area_path: settings.area_path.clone(),
            iteration_path: settings.iteration_path.clone(),
            assigned_to: settings.assigned_to.clone(),
            nature_field: settings.nature_field.clone(),
            cir_field: settings.cir_field.clone(),
            client: http::build_client(DEFAULT_TIMEOUT)?,
        })
    }

    /// Point the client at another organization URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn wit_url(&self, path: &str) -> String {
        format!("{}/{}/_apis/wit/{}", self.base_url, self.project, path)
    }

    fn html_url(&self, id: u64) -> String {
        format!("{}/{}/_workitems/edit/{}", self.base_url, self.project, id)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        // Basic auth with an empty user: base64(":" + pat)
        request.basic_auth("", Some(&self.pat))
    }

    fn patch_request(&self, url: String, operations: &[Value]) -> RequestBuilder {
        self.authorized(self.client.patch(url))
            .header("Content-Type", "application/json-patch+json")
            .json(operations)
    }

    /// JSON-patch operations for a new work item.
    pub fn create_operations(&self, item: &NewWorkItem) -> Vec<Value> {
        let title: String = item.title.chars().take(MAX_TITLE_LEN).collect();
        let mut ops = vec![add_field(fields::TITLE, json!(title))];

        if !item.description.is_empty() {
            ops.push(add_field(fields::DESCRIPTION, json!(item.description)));
        }
        if let Some(criteria) = &item.acceptance_criteria {
            ops.push(add_field(fields::ACCEPTANCE_CRITERIA, json!(criteria)));
        }
        if let Some(priority) = item.priority {
            ops.push(add_field(fields::PRIORITY, json!(priority)));
        }
        if let Some(points) = item.story_points {
            ops.push(add_field(fields::STORY_POINTS, json!(points)));
        }
        if let Some(hours) = item.remaining_work {
            ops.push(add_field(fields::REMAINING_WORK, json!(hours)));
        }
        if !item.tags.is_empty() {
            ops.push(add_field(fields::TAGS, json!(item.tags.join("; "))));
        }
        if let Some(path) = &self.iteration_path {
            ops.push(add_field(fields::ITERATION_PATH, json!(path)));
        }
        if let Some(path) = &self.area_path {
            ops.push(add_field(fields::AREA_PATH, json!(path)));
        }
        if let Some(user) = &self.assigned_to {
            ops.push(add_field(fields::ASSIGNED_TO, json!(user)));
        }

        let mut extra: BTreeMap<String, Value> = item.extra_fields.clone();
        if item.item_type == WorkItemType::ProductBacklogItem {
            extra
                .entry(self.nature_field.clone())
                .or_insert_with(|| json!(DEFAULT_NATURE));
            extra
                .entry(self.cir_field.clone())
                .or_insert_with(|| json!(DEFAULT_CIR));
        }
        for (name, value) in extra {
            ops.push(add_field(&name, value));
        }

        if let Some(parent) = item.parent_id {
            ops.push(json!({
                "op": "add",
                "path": "/relations/-",
                "value": {
                    "rel": PARENT_RELATION,
                    "url": self.wit_url(&format!("workItems/{}", parent)),
                }
            }));
        }
        ops
    }

    /// WIQL text for a search.
    pub fn wiql(query: &WorkItemQuery) -> String {
        let mut clauses = vec![
            "[System.TeamProject] = @project".to_string(),
            format!("[System.Title] CONTAINS '{}'", escape_wiql(&query.title_contains)),
        ];
        if let Some(item_type) = query.item_type {
            clauses.push(format!("[System.WorkItemType] = '{}'", item_type.as_str()));
        }
        for tag in &query.tags {
            clauses.push(format!("[System.Tags] CONTAINS '{}'", escape_wiql(tag)));
        }
        format!(
            "SELECT [System.Id] FROM WorkItems WHERE {} ORDER BY [System.CreatedDate] DESC",
            clauses.join(" AND ")
        )
    }

    fn into_work_item(&self, raw: RawWorkItem) -> WorkItem {
        let url = raw
            .links
            .and_then(|l| l.html)
            .map(|h| h.href)
            .unwrap_or_else(|| self.html_url(raw.id));
        WorkItem {
            id: raw.id,
            url,
            fields: raw.fields,
        }
    }

    async fn get_raw(&self, id: u64, expand_relations: bool) -> ClientResult<RawWorkItem> {
        let mut url = self.wit_url(&format!("workitems/{}?api-version={}", id, API_VERSION));
        if expand_relations {
            url.push_str("&$expand=relations");
        }
        let response = self.authorized(self.client.get(url)).send().await?;
        http::json(SERVICE, response).await
    }

    async fn get_many(&self, ids: &[u64]) -> ClientResult<Vec<WorkItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let url = self.wit_url(&format!(
            "workitems?ids={}&api-version={}",
            joined.join(","),
            API_VERSION
        ));
        let response = self.authorized(self.client.get(url)).send().await?;
        let batch: Batch = http::json(SERVICE, response).await?;
        Ok(batch.value.into_iter().map(|raw| self.into_work_item(raw)).collect())
    }
}

fn add_field(name: &str, value: Value) -> Value {
    json!({ "op": "add", "path": format!("/fields/{}", name), "value": value })
}

fn escape_wiql(text: &str) -> String {
    text.replace('\'', "''")
}

/// Work item id at the end of a relation URL.
fn id_from_url(url: &str) -> Option<u64> {
    url.rsplit('/').next()?.parse().ok()
}

#[async_trait]
impl IssueTracker for AzureDevOpsClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn create_work_item(&self, item: &NewWorkItem) -> ClientResult<WorkItem> {
        let type_segment = item.item_type.as_str().replace(' ', "%20");
        let url = self.wit_url(&format!("workitems/${}?api-version={}", type_segment, API_VERSION));
        let ops = self.create_operations(item);

        let response = self
            .authorized(self.client.post(url))
            .header("Content-Type", "application/json-patch+json")
            .json(&ops)
            .send()
            .await?;
        let raw: RawWorkItem = http::json(SERVICE, response).await?;
        let created = self.into_work_item(raw);
        info!("Created {} #{}: {}", item.item_type, created.id, created.title());
        Ok(created)
    }

    async fn update_work_item(
        &self,
        id: u64,
        fields: &[(&str, Value)],
        comment: Option<&str>,
    ) -> ClientResult<WorkItem> {
        let mut ops: Vec<Value> = fields
            .iter()
            .map(|(name, value)| add_field(name, value.clone()))
            .collect();
        if let Some(text) = comment {
            ops.push(add_field(fields::HISTORY, json!(text)));
        }

        let url = self.wit_url(&format!("workitems/{}?api-version={}", id, API_VERSION));
        let response = self.patch_request(url, &ops).send().await?;
        let raw: RawWorkItem = http::json(SERVICE, response).await?;
        debug!("Updated work item #{} ({} operations)", id, ops.len());
        Ok(self.into_work_item(raw))
    }

    async fn get_child_work_items(&self, id: u64) -> ClientResult<Vec<WorkItem>> {
        let parent = self.get_raw(id, true).await?;
        let ids: Vec<u64> = parent
            .relations
            .iter()
            .filter(|r| r.rel == CHILD_RELATION)
            .filter_map(|r| id_from_url(&r.url))
            .collect();
        debug!("Work item #{} has {} children", id, ids.len());
        self.get_many(&ids).await
    }

    async fn search_work_items(&self, query: &WorkItemQuery) -> ClientResult<Vec<WorkItem>> {
        let url = self.wit_url(&format!("wiql?api-version={}", API_VERSION));
        let body = json!({ "query": Self::wiql(query) });
        let response = self.authorized(self.client.post(url)).json(&body).send().await?;
        let result: WiqlResult = http::json(SERVICE, response).await?;

        let ids: Vec<u64> = result
            .work_items
            .iter()
            .take(query.max_results)
            .map(|r| r.id)
            .collect();
        self.get_many(&ids).await
    }

    async fn add_comment(&self, id: u64, text: &str) -> ClientResult<()> {
        self.update_work_item(id, &[], Some(text)).await?;
        debug!("Comment added to work item #{}", id);
        Ok(())
    }

    async fn attach_file(&self, id: u64, path: &Path, comment: &str) -> ClientResult<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ClientError::invalid(SERVICE, format!("not a file path: {:?}", path)))?;
        let bytes = tokio::fs::read(path).await?;

        let url = self.wit_url(&format!("attachments?fileName={}&api-version={}", name, API_VERSION));
        let response = self
            .authorized(self.client.post(url))
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        let attachment: Attachment = http::json(SERVICE, response).await?;

        let ops = vec![json!({
            "op": "add",
            "path": "/relations/-",
            "value": {
                "rel": "AttachedFile",
                "url": attachment.url,
                "attributes": { "comment": comment }
            }
        })];
        let url = self.wit_url(&format!("workitems/{}?api-version={}", id, API_VERSION));
        http::check(SERVICE, self.patch_request(url, &ops).send().await?).await?;
        info!("Attached {} to work item #{}", name, id);
        Ok(())
    }
}

// Azure DevOps API types
#[derive(Debug, Deserialize)]
struct RawWorkItem {
    id: u64,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
    #[serde(default)]
    relations: Vec<Relation>,
    #[serde(rename = "_links")]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct Relation {
    rel: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct Links {
    html: Option<Href>,
}

#[derive(Debug, Deserialize)]
struct Href {
    href: String,
}

#[derive(Debug, Deserialize)]
struct Batch {
    #[serde(default)]
    value: Vec<RawWorkItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WiqlResult {
    #[serde(default)]
    work_items: Vec<WiqlRef>,
}

#[derive(Debug, Deserialize)]
struct WiqlRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    url: String,
}
