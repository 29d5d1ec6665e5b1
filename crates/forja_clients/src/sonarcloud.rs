//! SonarCloud Web API client.

use std::collections::BTreeMap;

use async_trait::async_trait;
use forja_core::CloudQualitySettings;
use forja_policy::{Finding, IssueType, QualityGateStatus, Severity};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ClientError, ClientResult};
use crate::http::{self, DEFAULT_TIMEOUT};
use crate::quality::CloudQuality;

const SERVICE: &str = "sonarcloud";
const API_URL: &str = "https://sonarcloud.io/api";
const PAGE_SIZE: &str = "100";
const METRIC_KEYS: &str = "bugs,vulnerabilities,code_smells,coverage,duplicated_lines_density,ncloc,\
                           sqale_rating,reliability_rating,security_rating";

pub struct SonarCloudClient {
    token: String,
    organization: String,
    project_key: String,
    api_url: String,
    client: Client,
}

impl SonarCloudClient {
    pub fn from_settings(settings: &CloudQualitySettings) -> ClientResult<Self> {
        Ok(Self {
            token: settings.token.clone(),
            organization: settings.organization.clone(),
            project_key: settings.project_key.clone(),
            api_url: API_URL.to_string(),
            client: http::build_client(DEFAULT_TIMEOUT)?,
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn get(&self, endpoint: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/{}", self.api_url, endpoint))
            .bearer_auth(&self.token)
    }

    async fn fetch<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> ClientResult<T> {
        debug!("GET {} {:?}", endpoint, params);
        let response = self.get(endpoint).query(params).send().await?;
        http::json(SERVICE, response).await
    }
}

/// Map a raw issue to a finding; the component key loses its project prefix.
fn to_finding(issue: RawIssue) -> Finding {
    let mut finding = Finding::new(
        issue.rule,
        Severity::parse(&issue.severity),
        IssueType::parse(&issue.issue_type),
        issue.message,
    );
    if let Some(line) = issue.line {
        finding = finding.at_line(line);
    }
    if let Some(component) = issue.component {
        let path = component
            .split_once(':')
            .map(|(_, path)| path.to_string())
            .unwrap_or(component);
        finding = finding.in_component(path);
    }
    finding
}

/// Failed conditions as `metric: actual (comparator threshold)`.
fn failed_conditions(conditions: &[RawCondition]) -> Vec<String> {
    conditions
        .iter()
        .filter(|c| c.status.eq_ignore_ascii_case("ERROR"))
        .map(|c| {
            format!(
                "{}: {} ({} {})",
                c.metric_key,
                c.actual_value.as_deref().unwrap_or("?"),
                c.comparator.as_deref().unwrap_or(""),
                c.error_threshold.as_deref().unwrap_or("?")
            )
        })
        .collect()
}

#[async_trait]
impl CloudQuality for SonarCloudClient {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn verify_project(&self) -> ClientResult<()> {
        let status: SystemStatus = self.fetch("system/status", &[]).await?;
        if !status.status.eq_ignore_ascii_case("UP") {
            return Err(ClientError::invalid(SERVICE, format!("service status {}", status.status)));
        }
        let _: serde_json::Value = self
            .fetch("components/show", &[("component", self.project_key.as_str())])
            .await?;
        info!("SonarCloud project {} is reachable", self.project_key);
        Ok(())
    }

    async fn list_branches(&self) -> ClientResult<Vec<String>> {
        let list: BranchList = self
            .fetch("project_branches/list", &[("project", self.project_key.as_str())])
            .await?;
        Ok(list.branches.into_iter().map(|b| b.name).collect())
    }

    async fn get_issues(&self, branch: Option<&str>, severities: &[&str]) -> ClientResult<Vec<Finding>> {
        let joined = severities.join(",");
        let mut params = vec![
            ("componentKeys", self.project_key.as_str()),
            ("resolved", "false"),
            ("ps", PAGE_SIZE),
            ("organization", self.organization.as_str()),
        ];
        if let Some(branch) = branch {
            params.push(("branch", branch));
        }
        if !severities.is_empty() {
            params.push(("severities", joined.as_str()));
        }

        let result: IssueSearch = self.fetch("issues/search", &params).await?;
        debug!("SonarCloud returned {} of {} issues", result.issues.len(), result.total);
        Ok(result.issues.into_iter().map(to_finding).collect())
    }

    async fn get_quality_gate_status(&self, branch: Option<&str>) -> ClientResult<QualityGateStatus> {
        let mut params = vec![
            ("projectKey", self.project_key.as_str()),
            ("organization", self.organization.as_str()),
        ];
        if let Some(branch) = branch {
            params.push(("branch", branch));
        }
        let result: ProjectStatusResponse = self.fetch("qualitygates/project_status", &params).await?;
        Ok(QualityGateStatus {
            status: result.project_status.status,
            failed_conditions: failed_conditions(&result.project_status.conditions),
        })
    }

    async fn get_metrics(&self, branch: Option<&str>) -> ClientResult<BTreeMap<String, String>> {
        let mut params = vec![
            ("component", self.project_key.as_str()),
            ("metricKeys", METRIC_KEYS),
        ];
        if let Some(branch) = branch {
            params.push(("branch", branch));
        }
        let result: MeasuresResponse = self.fetch("measures/component", &params).await?;
        Ok(result
            .component
            .measures
            .into_iter()
            .filter_map(|m| m.value.map(|v| (m.metric, v)))
            .collect())
    }
}

// SonarCloud API types
#[derive(Debug, Deserialize)]
struct SystemStatus {
    status: String,
}

#[derive(Debug, Deserialize)]
struct BranchList {
    #[serde(default)]
    branches: Vec<RawBranch>,
}

#[derive(Debug, Deserialize)]
struct RawBranch {
    name: String,
}

#[derive(Debug, Deserialize)]
struct IssueSearch {
    #[serde(default)]
    total: usize,
    #[serde(default)]
    issues: Vec<RawIssue>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    rule: String,
    #[serde(default)]
    severity: String,
    #[serde(rename = "type", default)]
    issue_type: String,
    #[serde(default)]
    message: String,
    line: Option<usize>,
    component: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectStatusResponse {
    project_status: RawProjectStatus,
}

#[derive(Debug, Deserialize)]
struct RawProjectStatus {
    #[serde(default = "unknown_status")]
    status: String,
    #[serde(default)]
    conditions: Vec<RawCondition>,
}

fn unknown_status() -> String {
    "NONE".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCondition {
    status: String,
    metric_key: String,
    comparator: Option<String>,
    error_threshold: Option<String>,
    actual_value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeasuresResponse {
    component: RawComponent,
}

#[derive(Debug, Deserialize)]
struct RawComponent {
    #[serde(default)]
    measures: Vec<RawMeasure>,
}

#[derive(Debug, Deserialize)]
struct RawMeasure {
    metric: String,
    value: Option<String>,
}
