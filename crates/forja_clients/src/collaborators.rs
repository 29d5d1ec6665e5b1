//! The set of external collaborators handed to the agents.

use std::sync::Arc;

use forja_core::Settings;
use tracing::{info, warn};

use crate::azure::AzureDevOpsClient;
use crate::error::ClientResult;
use crate::github::GitHubClient;
use crate::local_git::LocalGit;
use crate::noop::{NoopCloudQuality, NoopSourceControl, NoopTracker};
use crate::quality::CloudQuality;
use crate::scm::SourceControl;
use crate::sonarcloud::SonarCloudClient;
use crate::tracker::IssueTracker;

/// Issue tracker, source-control host, cloud quality service and local clone.
///
/// Switched-off collaborators are `Noop*` values, so callers never check flags.
#[derive(Clone)]
pub struct Collaborators {
    pub tracker: Arc<dyn IssueTracker>,
    pub scm: Arc<dyn SourceControl>,
    pub quality: Arc<dyn CloudQuality>,
    pub local_git: Option<LocalGit>,
}

impl Collaborators {
    /// Everything switched off.
    pub fn disabled() -> Self {
        Self {
            tracker: Arc::new(NoopTracker),
            scm: Arc::new(NoopSourceControl::default()),
            quality: Arc::new(NoopCloudQuality),
            local_git: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> ClientResult<Self> {
        let mut collaborators = Self::disabled();

        if settings.tracker.is_usable() {
            info!("Issue tracker enabled: {}/{}", settings.tracker.organization, settings.tracker.project);
            collaborators = collaborators.with_tracker(Arc::new(AzureDevOpsClient::from_settings(&settings.tracker)?));
        } else if settings.tracker.enabled {
            warn!("Issue tracker enabled without credentials, treating it as disabled");
        }

        if settings.scm.is_usable() {
            info!("Source control enabled: {}/{}", settings.scm.owner, settings.scm.repo);
            collaborators = collaborators.with_scm(Arc::new(GitHubClient::from_settings(&settings.scm)?));
            if let Some(path) = &settings.scm.repo_path {
                collaborators = collaborators.with_local_git(LocalGit::new(path));
            }
        } else {
            if settings.scm.enabled {
                warn!("Source control enabled without credentials, treating it as disabled");
            }
            collaborators = collaborators.with_scm(Arc::new(NoopSourceControl::new(settings.scm.base_branch.clone())));
        }

        if settings.cloud_quality.is_usable() {
            info!("Cloud quality enabled: {}", settings.cloud_quality.project_key);
            collaborators = collaborators.with_quality(Arc::new(SonarCloudClient::from_settings(&settings.cloud_quality)?));
        } else if settings.cloud_quality.enabled {
            warn!("Cloud quality enabled without credentials, treating it as disabled");
        }

        Ok(collaborators)
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn IssueTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_scm(mut self, scm: Arc<dyn SourceControl>) -> Self {
        self.scm = scm;
        self
    }

    pub fn with_quality(mut self, quality: Arc<dyn CloudQuality>) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_local_git(mut self, local_git: LocalGit) -> Self {
        self.local_git = Some(local_git);
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_disable_everything() {
        let collaborators = Collaborators::from_settings(&Settings::default()).unwrap();
        assert_eq!(collaborators.tracker.name(), "noop_tracker");
        assert_eq!(collaborators.scm.name(), "noop_scm");
        assert_eq!(collaborators.quality.name(), "noop_quality");
        assert!(collaborators.local_git.is_none());
    }

    #[test]
    fn test_enabled_without_credentials_stays_disabled() {
        let mut settings = Settings::default();
        settings.tracker.enabled = true;
        settings.scm.enabled = true;
        settings.scm.base_branch = "develop".to_string();

        let collaborators = Collaborators::from_settings(&settings).unwrap();
        assert_eq!(collaborators.tracker.name(), "noop_tracker");
        assert_eq!(collaborators.scm.base_branch(), "develop");
    }

    #[test]
    fn test_usable_settings_build_clients() {
        let mut settings = Settings::default();
        settings.scm.enabled = true;
        settings.scm.token = "ghp_x".to_string();
        settings.scm.owner = "acme".to_string();
        settings.scm.repo = "demo".to_string();
        settings.scm.repo_path = Some("/tmp/demo".into());
        settings.cloud_quality.enabled = true;
        settings.cloud_quality.token = "t".to_string();
        settings.cloud_quality.organization = "acme".to_string();
        settings.cloud_quality.project_key = "acme_demo".to_string();

        let collaborators = Collaborators::from_settings(&settings).unwrap();
        assert_eq!(collaborators.scm.name(), "github");
        assert_eq!(collaborators.quality.name(), "sonarcloud");
        assert!(collaborators.local_git.is_some());
    }
}
