//! GitHub REST client implementing [`SourceControl`].

use async_trait::async_trait;
use forja_core::ScmSettings;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::http::{self, DEFAULT_TIMEOUT};
use crate::scm::{
    CommitResult, FileChange, MergeMethod, MergeResult, PullRequest, ReviewEvent, SourceControl,
};

const SERVICE: &str = "github";
const API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

pub struct GitHubClient {
    token: String,
    reviewer_token: Option<String>,
    owner: String,
    repo: String,
    base_branch: String,
    api_url: String,
    client: Client,
}

impl GitHubClient {
    pub fn from_settings(settings: &ScmSettings) -> ClientResult<Self> {
        Ok(Self {
            token: settings.token.clone(),
            reviewer_token: settings.reviewer_token.clone().filter(|t| !t.is_empty()),
            owner: settings.owner.clone(),
            repo: settings.repo.clone(),
            base_branch: settings.base_branch.clone(),
            api_url: API_URL.to_string(),
            client: http::build_client(DEFAULT_TIMEOUT)?,
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_url, self.owner, self.repo, path)
    }

    fn request_as(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, self.repo_url(path))
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", token))
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.request_as(method, path, &self.token)
    }

    /// Reviews go out under the reviewer identity when one is configured.
    fn reviewer_token(&self) -> &str {
        self.reviewer_token.as_deref().unwrap_or(&self.token)
    }

    async fn find_open_pr(&self, branch: &str) -> ClientResult<Option<PullRequest>> {
        let head = format!("{}:{}", self.owner, branch);
        let response = self
            .request(Method::GET, "pulls")
            .query(&[("state", "open"), ("head", head.as_str())])
            .send()
            .await?;
        let pulls: Vec<RawPull> = decode(response).await?;
        Ok(pulls.into_iter().next().map(RawPull::into_pull_request))
    }

    async fn create_blob(&self, content: &str) -> ClientResult<String> {
        let body = json!({ "content": content, "encoding": "utf-8" });
        let response = self.request(Method::POST, "git/blobs").json(&body).send().await?;
        let blob: ShaRef = decode(response).await?;
        Ok(blob.sha)
    }
}

/// Error detail out of a GitHub error body, falling back to the raw text.
fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(error) => {
            let detail = error
                .errors
                .first()
                .and_then(|e| e.message.clone())
                .unwrap_or_default();
            if detail.is_empty() {
                error.message
            } else {
                format!("{}: {}", error.message, detail)
            }
        }
        Err(_) => http::truncate_body(body),
    }
}

/// Like [`http::check`] but reads GitHub's structured error body.
async fn check(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::api(SERVICE, status.as_u16(), api_error_message(&body)))
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> ClientResult<T> {
    let response = check(response).await?;
    http::json(SERVICE, response).await
}

fn is_unprocessable(error: &ClientError) -> bool {
    error.status() == Some(422)
}

#[async_trait]
impl SourceControl for GitHubClient {
    fn name(&self) -> &str {
        SERVICE
    }

    fn base_branch(&self) -> &str {
        &self.base_branch
    }

    async fn branch_sha(&self, branch: &str) -> ClientResult<String> {
        let response = self
            .request(Method::GET, &format!("git/ref/heads/{}", branch))
            .send()
            .await?;
        let reference: RawRef = decode(response).await?;
        Ok(reference.object.sha)
    }

    async fn create_branch(&self, base_sha: &str, name: &str) -> ClientResult<String> {
        let body = json!({ "ref": format!("refs/heads/{}", name), "sha": base_sha });
        let response = self.request(Method::POST, "git/refs").json(&body).send().await?;
        match decode::<RawRef>(response).await {
            Ok(reference) => {
                info!("Created branch {}", name);
                Ok(reference.object.sha)
            }
            Err(e) if is_unprocessable(&e) => {
                debug!("Branch {} already exists, reusing it", name);
                self.branch_sha(name).await
            }
            Err(e) => Err(e),
        }
    }

    async fn create_commit(
        &self,
        branch: &str,
        files: &[FileChange],
        message: &str,
    ) -> ClientResult<CommitResult> {
        let parent = self.branch_sha(branch).await?;

        let response = self
            .request(Method::GET, &format!("git/commits/{}", parent))
            .send()
            .await?;
        let parent_commit: RawCommit = decode(response).await?;

        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let sha = self.create_blob(&file.content).await?;
            entries.push(TreeEntry {
                path: file.path.clone(),
                mode: "100644",
                kind: "blob",
                sha,
            });
        }

        let tree_body = json!({ "base_tree": parent_commit.tree.sha, "tree": entries });
        let response = self.request(Method::POST, "git/trees").json(&tree_body).send().await?;
        let tree: ShaRef = decode(response).await?;

        let commit_body = json!({ "message": message, "tree": tree.sha, "parents": [parent] });
        let response = self.request(Method::POST, "git/commits").json(&commit_body).send().await?;
        let commit: ShaRef = decode(response).await?;

        let ref_body = json!({ "sha": commit.sha, "force": true });
        let response = self
            .request(Method::PATCH, &format!("git/refs/heads/{}", branch))
            .json(&ref_body)
            .send()
            .await?;
        check(response).await?;

        info!("Committed {} file(s) to {} ({})", files.len(), branch, commit.sha);
        Ok(CommitResult {
            sha: commit.sha,
            branch: branch.to_string(),
        })
    }

    async fn create_pr(&self, branch: &str, title: &str, body: &str) -> ClientResult<PullRequest> {
        let request = CreatePrRequest {
            title,
            body,
            head: branch,
            base: &self.base_branch,
        };
        let response = self.request(Method::POST, "pulls").json(&request).send().await?;
        match decode::<RawPull>(response).await {
            Ok(pull) => {
                let pr = pull.into_pull_request();
                info!("Opened PR #{}: {}", pr.number, pr.url);
                Ok(pr)
            }
            Err(e) if is_unprocessable(&e) => {
                debug!("PR for {} already exists: {}", branch, e);
                self.find_open_pr(branch).await?.ok_or(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_review(&self, pr: u64, event: ReviewEvent, body: &str) -> ClientResult<ReviewEvent> {
        let path = format!("pulls/{}/reviews", pr);
        let token = self.reviewer_token();

        let response = self
            .request_as(Method::POST, &path, token)
            .json(&json!({ "body": body, "event": event }))
            .send()
            .await?;
        match check(response).await {
            Ok(_) => Ok(event),
            // Authors cannot approve their own PRs
            Err(e) if is_unprocessable(&e) && event == ReviewEvent::Approve => {
                warn!("Approval refused on PR #{} ({}), posting a comment review", pr, e);
                let response = self
                    .request_as(Method::POST, &path, token)
                    .json(&json!({ "body": body, "event": ReviewEvent::Comment }))
                    .send()
                    .await?;
                check(response).await?;
                Ok(ReviewEvent::Comment)
            }
            Err(e) => Err(e),
        }
    }

    async fn add_pr_comment(&self, pr: u64, body: &str) -> ClientResult<()> {
        let response = self
            .request(Method::POST, &format!("issues/{}/comments", pr))
            .json(&json!({ "body": body }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn is_mergeable(&self, pr: u64) -> ClientResult<Option<bool>> {
        let response = self.request(Method::GET, &format!("pulls/{}", pr)).send().await?;
        let pull: RawPull = decode(response).await?;
        Ok(pull.mergeable)
    }

    async fn merge_pr(
        &self,
        pr: u64,
        method: MergeMethod,
        title: &str,
        message: &str,
    ) -> ClientResult<MergeResult> {
        let body = json!({
            "commit_title": title,
            "commit_message": message,
            "merge_method": method.as_str(),
        });
        let response = self
            .request(Method::PUT, &format!("pulls/{}/merge", pr))
            .json(&body)
            .send()
            .await?;
        let merged: RawMerge = decode(response).await?;
        Ok(MergeResult {
            merged: merged.merged,
            sha: merged.sha,
            message: merged.message,
        })
    }

    async fn delete_branch(&self, name: &str) -> ClientResult<()> {
        let response = self
            .request(Method::DELETE, &format!("git/refs/heads/{}", name))
            .send()
            .await?;
        match check(response).await {
            Ok(_) => {
                info!("Deleted remote branch {}", name);
                Ok(())
            }
            Err(e) if e.status() == Some(404) || is_unprocessable(&e) => {
                debug!("Remote branch {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn get_pr_files(&self, pr: u64) -> ClientResult<Vec<String>> {
        let response = self
            .request(Method::GET, &format!("pulls/{}/files", pr))
            .send()
            .await?;
        let files: Vec<RawPrFile> = decode(response).await?;
        Ok(files.into_iter().map(|f| f.filename).collect())
    }
}

// GitHub API types
#[derive(Serialize)]
struct CreatePrRequest<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Serialize)]
struct TreeEntry {
    path: String,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    sha: String,
}

#[derive(Deserialize)]
struct ShaRef {
    sha: String,
}

#[derive(Deserialize)]
struct RawRef {
    object: ShaRef,
}

#[derive(Deserialize)]
struct RawCommit {
    tree: ShaRef,
}

#[derive(Deserialize)]
struct RawPull {
    number: u64,
    html_url: String,
    #[serde(default)]
    title: String,
    head: RawPullHead,
    #[serde(default)]
    mergeable: Option<bool>,
}

#[derive(Deserialize)]
struct RawPullHead {
    #[serde(rename = "ref")]
    name: String,
}

impl RawPull {
    fn into_pull_request(self) -> PullRequest {
        PullRequest {
            number: self.number,
            url: self.html_url,
            title: self.title,
            head: self.head.name,
        }
    }
}

#[derive(Deserialize)]
struct RawMerge {
    #[serde(default)]
    merged: bool,
    sha: Option<String>,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct RawPrFile {
    filename: String,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}
