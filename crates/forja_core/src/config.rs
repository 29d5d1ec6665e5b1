//! Central, immutable configuration.
//!
//! Settings are read once at startup from the environment (after loading a
//! `.env` file if present) and then shared read-only as `Arc<Settings>`.
//! Collaborators whose enable flag is unset are disabled; their side effects
//! are skipped without changing control flow.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// LLM provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub api_key: String,
    pub model: String,
    pub mock_mode: bool,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Attempts for transient provider errors (overload, rate limit).
    pub max_api_retries: u32,
    /// Base delay in seconds; attempt `n` waits `base * 2^n`.
    pub retry_base_delay_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            mock_mode: false,
            temperature: 0.1,
            max_output_tokens: 4000,
            max_api_retries: 3,
            retry_base_delay_secs: 2,
            request_timeout_secs: 120,
        }
    }
}

/// Retry budgets for the outer loop and the three inner loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudgets {
    pub max_attempts: u32,
    pub max_debug_attempts: u32,
    pub max_sonarqube_attempts: u32,
    pub max_revisor_attempts: u32,
    /// Test regenerations allowed inside a single test-agent visit.
    pub max_test_fix_attempts: u32,
}

impl Default for RetryBudgets {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            max_debug_attempts: 3,
            max_sonarqube_attempts: 2,
            max_revisor_attempts: 2,
            max_test_fix_attempts: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Timeouts {
    pub test_execution_secs: u64,
    pub cloud_analysis_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            test_execution_secs: 60,
            cloud_analysis_secs: 300,
        }
    }
}

impl Timeouts {
    pub fn test_execution(&self) -> Duration {
        Duration::from_secs(self.test_execution_secs)
    }

    pub fn cloud_analysis(&self) -> Duration {
        Duration::from_secs(self.cloud_analysis_secs)
    }
}

/// Issue tracker (Azure DevOps) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSettings {
    pub enabled: bool,
    pub organization: String,
    pub project: String,
    pub pat: String,
    pub area_path: Option<String>,
    pub iteration_path: Option<String>,
    pub assigned_to: Option<String>,
    pub release_note_field: String,
    pub nature_field: String,
    pub cir_field: String,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            organization: String::new(),
            project: String::new(),
            pat: String::new(),
            area_path: None,
            iteration_path: None,
            assigned_to: None,
            release_note_field: "Custom.ReleaseNote".to_string(),
            nature_field: "Custom.Nature".to_string(),
            cir_field: "Custom.CIR".to_string(),
        }
    }
}

impl TrackerSettings {
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.organization.is_empty() && !self.project.is_empty() && !self.pat.is_empty()
    }
}

/// Source-control host (GitHub) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScmSettings {
    pub enabled: bool,
    pub token: String,
    /// Distinct identity allowed to approve PRs opened with `token`.
    pub reviewer_token: Option<String>,
    pub owner: String,
    pub repo: String,
    pub base_branch: String,
    /// Local clone used for file copies and local branch cleanup.
    pub repo_path: Option<PathBuf>,
}

impl Default for ScmSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            reviewer_token: None,
            owner: String::new(),
            repo: String::new(),
            base_branch: "main".to_string(),
            repo_path: None,
        }
    }
}

impl ScmSettings {
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.token.is_empty() && !self.owner.is_empty() && !self.repo.is_empty()
    }
}

/// Cloud static-analysis (SonarCloud) settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudQualitySettings {
    pub enabled: bool,
    pub token: String,
    pub organization: String,
    pub project_key: String,
}

impl CloudQualitySettings {
    pub fn is_usable(&self) -> bool {
        self.enabled
            && !self.token.is_empty()
            && !self.organization.is_empty()
            && !self.project_key.is_empty()
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub llm: LlmSettings,
    pub budgets: RetryBudgets,
    pub timeouts: Timeouts,
    pub tracker: TrackerSettings,
    pub scm: ScmSettings,
    pub cloud_quality: CloudQualitySettings,
    pub output_dir: PathBuf,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            budgets: RetryBudgets::default(),
            timeouts: Timeouts::default(),
            tracker: TrackerSettings::default(),
            scm: ScmSettings::default(),
            cloud_quality: CloudQualitySettings::default(),
            output_dir: PathBuf::from("output"),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the process environment, reading `.env` first.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {:?}", path);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let defaults = Self::default();

        let llm = LlmSettings {
            api_key: env.string("GEMINI_API_KEY").unwrap_or_default(),
            model: env.string("MODEL_NAME").unwrap_or(defaults.llm.model),
            mock_mode: env.flag("LLM_MOCK_MODE"),
            temperature: env.parse("TEMPERATURE").unwrap_or(defaults.llm.temperature),
            max_output_tokens: env
                .parse("MAX_OUTPUT_TOKENS")
                .unwrap_or(defaults.llm.max_output_tokens),
            max_api_retries: env
                .parse("MAX_API_RETRIES")
                .unwrap_or(defaults.llm.max_api_retries),
            retry_base_delay_secs: env
                .parse("RETRY_BASE_DELAY")
                .unwrap_or(defaults.llm.retry_base_delay_secs),
            request_timeout_secs: env
                .parse("LLM_TIMEOUT")
                .unwrap_or(defaults.llm.request_timeout_secs),
        };

        let budgets = RetryBudgets {
            max_attempts: env.parse("MAX_ATTEMPTS").unwrap_or(defaults.budgets.max_attempts),
            max_debug_attempts: env
                .parse("MAX_DEBUG_ATTEMPTS")
                .unwrap_or(defaults.budgets.max_debug_attempts),
            max_sonarqube_attempts: env
                .parse("MAX_SONARQUBE_ATTEMPTS")
                .unwrap_or(defaults.budgets.max_sonarqube_attempts),
            max_revisor_attempts: env
                .parse("MAX_REVISOR_ATTEMPTS")
                .unwrap_or(defaults.budgets.max_revisor_attempts),
            max_test_fix_attempts: env
                .parse("MAX_TEST_FIX_ATTEMPTS")
                .unwrap_or(defaults.budgets.max_test_fix_attempts),
        };

        let timeouts = Timeouts {
            test_execution_secs: env
                .parse("TEST_EXECUTION_TIMEOUT")
                .unwrap_or(defaults.timeouts.test_execution_secs),
            cloud_analysis_secs: env
                .parse("SONARCLOUD_ANALYSIS_TIMEOUT")
                .unwrap_or(defaults.timeouts.cloud_analysis_secs),
        };

        let tracker = TrackerSettings {
            enabled: env.flag("AZURE_DEVOPS_ENABLED"),
            organization: env.string("AZURE_DEVOPS_ORG").unwrap_or_default(),
            project: env.string("AZURE_DEVOPS_PROJECT").unwrap_or_default(),
            pat: env.string("AZURE_DEVOPS_PAT").unwrap_or_default(),
            area_path: env.string("AZURE_AREA_PATH"),
            iteration_path: env.string("AZURE_ITERATION_PATH"),
            assigned_to: env.string("AZURE_ASSIGNED_TO"),
            release_note_field: env
                .string("AZURE_RELEASE_NOTE_FIELD")
                .unwrap_or(defaults.tracker.release_note_field),
            nature_field: env
                .string("AZURE_NATURE_FIELD")
                .unwrap_or(defaults.tracker.nature_field),
            cir_field: env.string("AZURE_CIR_FIELD").unwrap_or(defaults.tracker.cir_field),
        };

        let scm = ScmSettings {
            enabled: env.flag("GITHUB_ENABLED"),
            token: env.string("GITHUB_TOKEN").unwrap_or_default(),
            reviewer_token: env.string("GITHUB_REVIEWER_TOKEN"),
            owner: env.string("GITHUB_OWNER").unwrap_or_default(),
            repo: env.string("GITHUB_REPO").unwrap_or_default(),
            base_branch: env
                .string("GITHUB_BASE_BRANCH")
                .unwrap_or(defaults.scm.base_branch),
            repo_path: env.string("GITHUB_REPO_PATH").map(PathBuf::from),
        };

        let cloud_quality = CloudQualitySettings {
            enabled: env.flag("SONARCLOUD_ENABLED"),
            token: env.string("SONARCLOUD_TOKEN").unwrap_or_default(),
            organization: env.string("SONARCLOUD_ORGANIZATION").unwrap_or_default(),
            project_key: env.string("SONARCLOUD_PROJECT_KEY").unwrap_or_default(),
        };

        Self {
            llm,
            budgets,
            timeouts,
            tracker,
            scm,
            cloud_quality,
            output_dir: env
                .string("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            log_level: env.string("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    /// Report configuration problems as human-readable warnings.
    ///
    /// A collaborator enabled without credentials is listed here and treated as
    /// disabled by the collaborator factory.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.llm.mock_mode && self.llm.api_key.is_empty() {
            warnings.push("GEMINI_API_KEY is not set and mock mode is off".to_string());
        }
        if self.tracker.enabled && !self.tracker.is_usable() {
            warnings.push(
                "AZURE_DEVOPS_ENABLED is set but organization, project or PAT is missing".to_string(),
            );
        }
        if self.scm.enabled && !self.scm.is_usable() {
            warnings.push("GITHUB_ENABLED is set but token, owner or repo is missing".to_string());
        }
        if self.cloud_quality.enabled && !self.cloud_quality.is_usable() {
            warnings.push(
                "SONARCLOUD_ENABLED is set but token, organization or project key is missing"
                    .to_string(),
            );
        }

        for w in &warnings {
            warn!("{}", w);
        }
        warnings
    }

    /// Copy of the settings with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.llm.api_key = mask(&copy.llm.api_key);
        copy.tracker.pat = mask(&copy.tracker.pat);
        copy.scm.token = mask(&copy.scm.token);
        copy.scm.reviewer_token = copy.scm.reviewer_token.as_deref().map(mask);
        copy.cloud_quality.token = mask(&copy.cloud_quality.token);
        copy
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_mock_mode(mut self, enabled: bool) -> Self {
        self.llm.mock_mode = enabled;
        self
    }

    pub fn with_budgets(mut self, budgets: RetryBudgets) -> Self {
        self.budgets = budgets;
        self
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn flag(&self, key: &str) -> bool {
        self.string(key)
            .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
            .unwrap_or(false)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.string(key)?;
        match raw.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid value for {}: '{}'", key, raw);
                None
            }
        }
    }
}
