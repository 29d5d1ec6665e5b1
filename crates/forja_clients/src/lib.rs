//! # forja_clients
//!
//! Thin clients for the external collaborators the pipeline mirrors its
//! progress into.
//!
//! # Features
//!
//! - **Issue Tracker**: Azure DevOps work items (create, update, search, children, attachments)
//! - **Source Control**: GitHub refs, Git-data commits, pull requests, reviews and merges
//! - **Cloud Quality**: SonarCloud issues, quality-gate status and metrics with default-branch fallback
//! - **Local Git**: Local clone copies and merged-branch cleanup
//! - **No-op Collaborators**: Switched-off services report `Disabled` instead of branching callers
//!
//! # Example
//!
//! ```rust,no_run
//! use forja_clients::{Collaborators, WorkItemQuery, WorkItemType, AI_TAG};
//! use forja_core::Settings;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let collaborators = Collaborators::from_settings(&Settings::from_env())?;
//!
//!     let query = WorkItemQuery::title_contains("sumar")
//!         .of_type(WorkItemType::ProductBacklogItem)
//!         .tagged(AI_TAG);
//!     match collaborators.tracker.search_work_items(&query).await {
//!         Ok(items) => println!("{} matching PBIs", items.len()),
//!         Err(e) if e.is_disabled() => println!("tracker disabled"),
//!         Err(e) => return Err(e.into()),
//!     }
//!     Ok(())
//! }
//! ```

pub mod azure;
pub mod collaborators;
pub mod error;
pub mod github;
pub mod http;
pub mod local_git;
pub mod noop;
pub mod quality;
pub mod scm;
pub mod sonarcloud;
pub mod tracker;

pub use azure::AzureDevOpsClient;
pub use collaborators::Collaborators;
pub use error::{ClientError, ClientResult};
pub use github::GitHubClient;
pub use local_git::LocalGit;
pub use noop::{NoopCloudQuality, NoopSourceControl, NoopTracker};
pub use quality::{CloudAnalysis, CloudQuality};
pub use scm::{CommitResult, FileChange, MergeMethod, MergeResult, PullRequest, ReviewEvent, SourceControl};
pub use sonarcloud::SonarCloudClient;
pub use tracker::{states, IssueTracker, NewWorkItem, WorkItem, WorkItemQuery, WorkItemType, AI_TAG};
