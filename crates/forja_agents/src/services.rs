//! Shared dependencies of the agents.
//!
//! Every node holds an `Arc<AgentServices>`: the settings, the LLM gateway,
//! the external collaborators, the command runner used by the sandbox, the
//! artifact directory and the local analyzer.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use forja_clients::{ClientResult, Collaborators};
use forja_core::{ArtifactStore, Settings};
use forja_llm::{gateway_from_settings, is_error_sentinel, LlmGateway, LlmRequest, GENERAL_ERROR_PREFIX};
use forja_policy::{AcceptanceRule, LocalAnalyzer};
use forja_runner::{CommandRunner, ProcessRunner, ProcessRunnerOptions, Sandbox};
use tracing::{debug, warn};

use crate::error::AgentResult;

/// Dependencies injected into every agent.
pub struct AgentServices {
    pub settings: Arc<Settings>,
    pub llm: Arc<dyn LlmGateway>,
    pub collaborators: Collaborators,
    pub runner: Arc<dyn CommandRunner>,
    pub artifacts: ArtifactStore,
    pub analyzer: LocalAnalyzer,
    pub rule: AcceptanceRule,
}

impl AgentServices {
    /// Services with every collaborator switched off.
    pub fn new(
        settings: Settings,
        llm: Arc<dyn LlmGateway>,
        runner: Arc<dyn CommandRunner>,
    ) -> AgentResult<Self> {
        let artifacts = ArtifactStore::new(settings.output_dir.clone());
        Ok(Self {
            settings: Arc::new(settings),
            llm,
            collaborators: Collaborators::disabled(),
            runner,
            artifacts,
            analyzer: LocalAnalyzer::new()?,
            rule: AcceptanceRule::default(),
        })
    }

    /// Production wiring: gateway, collaborators and process runner from the settings.
    pub fn from_settings(settings: Settings) -> AgentResult<Self> {
        let llm = gateway_from_settings(&settings.llm)?;
        let collaborators = Collaborators::from_settings(&settings)?;
        let runner = Arc::new(ProcessRunner::new(ProcessRunnerOptions::default()));
        Ok(Self::new(settings, llm, runner)?.with_collaborators(collaborators))
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn mock_mode(&self) -> bool {
        self.settings.llm.mock_mode
    }

    /// Call the LLM.
    ///
    /// Fatal errors propagate. Any other error is lowered into an
    /// `ERROR_GENERAL:` sentinel so that the caller's gate fails normally.
    pub async fn ask(&self, request: LlmRequest) -> AgentResult<String> {
        match self.llm.call(&request).await {
            Ok(text) => {
                if is_error_sentinel(&text) {
                    warn!("LLM returned an error for {}: {}", request.role, text.trim());
                }
                Ok(text)
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                warn!("LLM call for {} failed: {}", request.role, e);
                Ok(format!("{} {}", GENERAL_ERROR_PREFIX, e))
            }
        }
    }

    /// Persist an artifact; a failed write is logged and skipped.
    pub fn save(&self, name: &str, contents: &str) -> Option<PathBuf> {
        match self.artifacts.write(name, contents) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Could not write artifact {}: {}", name, e);
                None
            }
        }
    }

    /// Sandbox rooted at the artifact directory.
    pub fn sandbox(&self) -> Sandbox {
        Sandbox::new(self.artifacts.root(), Arc::clone(&self.runner))
            .with_timeout(self.settings.timeouts.test_execution())
    }
}

/// Await a collaborator call, turning failures into a log line.
pub async fn soft<T, F>(action: &str, call: F) -> Option<T>
where
    F: Future<Output = ClientResult<T>>,
{
    soft_result(action, call.await)
}

/// Synchronous counterpart of [`soft`].
pub fn soft_result<T>(action: &str, result: ClientResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) if e.is_disabled() => {
            debug!("Skipped {}: {}", action, e);
            None
        }
        Err(e) => {
            warn!("Could not {}: {}", action, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forja_clients::ClientError;
    use forja_llm::{Role, ScriptedLlm};
    use forja_runner::MockRunner;
    use tempfile::TempDir;

    fn services(dir: &TempDir, llm: Arc<dyn LlmGateway>) -> AgentServices {
        let settings = Settings::default().with_output_dir(dir.path());
        AgentServices::new(settings, llm, Arc::new(MockRunner::new())).unwrap()
    }

    #[tokio::test]
    async fn test_ask_propagates_only_fatal_errors() {
        let temp = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLlm::new());
        llm.push(Role::Developer, "ERROR_API: overloaded")
            .push_fatal(Role::Developer, "model gone");
        let services = services(&temp, llm);

        let sentinel = services
            .ask(LlmRequest::new(Role::Developer, "ctx"))
            .await
            .unwrap();
        assert!(is_error_sentinel(&sentinel));

        let err = services
            .ask(LlmRequest::new(Role::Developer, "ctx"))
            .await
            .unwrap_err();
        assert!(err.is_llm_fatal());
    }

    #[tokio::test]
    async fn test_soft_swallows_errors() {
        let ok: Option<u32> = soft("count", async { Ok(3) }).await;
        assert_eq!(ok, Some(3));

        let disabled: Option<u32> =
            soft("count", async { Err(ClientError::Disabled("tracker".to_string())) }).await;
        assert!(disabled.is_none());

        let failed: Option<u32> = soft_result("count", Err(ClientError::api("github", 500, "boom")));
        assert!(failed.is_none());
    }

    #[test]
    fn test_save_and_sandbox_use_output_dir() {
        let temp = TempDir::new().unwrap();
        let services = services(&temp, Arc::new(ScriptedLlm::new()));
        let path = services.save("5_review_req1.txt", "ok").unwrap();
        assert!(path.starts_with(temp.path()));
        assert_eq!(services.sandbox().dir(), temp.path());
        assert!(!services.mock_mode());
    }
}
