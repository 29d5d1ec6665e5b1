//! CLI command definitions.
//!
//! Every subcommand reads the same settings: environment variables (and a
//! `.env` file) first, then the global overrides below.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use forja_core::Settings;

pub mod analyze;
pub mod classify;
pub mod config;
pub mod run;

/// Forja - multi-agent code generation pipeline
#[derive(Parser)]
#[command(name = "forja")]
#[command(version, about = "Forja - multi-agent code generation pipeline")]
#[command(long_about = r#"
Forja turns a natural-language request into validated code: formal
requirements, implementation, static analysis, unit tests, review, merge and
business validation, each step handled by a dedicated agent.

COMMANDS:
  run       → Run the full pipeline on a prompt
  analyze   → Run the local static analyzer and the acceptance rule on a file
  classify  → Classify a test-runner log as a test or production fault
  config    → Print the effective configuration (secrets redacted)

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Configuration error
  4 - Fatal LLM error
  5 - Workflow ended without success
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub overrides: SettingsOverrides,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline on a natural-language request
    Run(run::RunArgs),

    /// Analyze a source file with the local analyzer
    Analyze(analyze::AnalyzeArgs),

    /// Classify a captured test-runner output
    Classify(classify::ClassifyArgs),

    /// Show the effective configuration
    Config(config::ConfigArgs),
}

/// Command-line overrides applied on top of the environment.
#[derive(Args, Debug, Default, Clone)]
pub struct SettingsOverrides {
    /// Artifact directory
    #[arg(long, global = true, env = "OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Answer every LLM call with canned responses
    #[arg(long, global = true)]
    pub mock: bool,

    /// Outer iterations (stakeholder rejections)
    #[arg(long, global = true, env = "MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,

    /// Production-code fixes after failing tests
    #[arg(long, global = true, env = "MAX_DEBUG_ATTEMPTS")]
    pub max_debug_attempts: Option<u32>,

    /// Corrections after a failed quality gate
    #[arg(long, global = true, env = "MAX_SONARQUBE_ATTEMPTS")]
    pub max_sonarqube_attempts: Option<u32>,

    /// Corrections after a rejected review
    #[arg(long, global = true, env = "MAX_REVISOR_ATTEMPTS")]
    pub max_revisor_attempts: Option<u32>,

    /// Test regenerations inside one test-agent visit
    #[arg(long, global = true, env = "MAX_TEST_FIX_ATTEMPTS")]
    pub max_test_fix_attempts: Option<u32>,
}

impl SettingsOverrides {
    /// Apply the overrides; unset flags keep the loaded values.
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(dir) = &self.output_dir {
            settings = settings.with_output_dir(dir);
        }
        if self.mock {
            settings = settings.with_mock_mode(true);
        }

        let mut budgets = settings.budgets.clone();
        if let Some(v) = self.max_attempts {
            budgets.max_attempts = v;
        }
        if let Some(v) = self.max_debug_attempts {
            budgets.max_debug_attempts = v;
        }
        if let Some(v) = self.max_sonarqube_attempts {
            budgets.max_sonarqube_attempts = v;
        }
        if let Some(v) = self.max_revisor_attempts {
            budgets.max_revisor_attempts = v;
        }
        if let Some(v) = self.max_test_fix_attempts {
            budgets.max_test_fix_attempts = v;
        }
        settings.with_budgets(budgets)
    }

    /// Environment settings with these overrides applied.
    pub fn load(&self) -> Settings {
        self.apply(Settings::from_env())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_keep_unset_values() {
        let overrides = SettingsOverrides {
            max_debug_attempts: Some(5),
            mock: true,
            ..Default::default()
        };
        let settings = overrides.apply(Settings::default());

        assert!(settings.llm.mock_mode);
        assert_eq!(settings.budgets.max_debug_attempts, 5);
        assert_eq!(settings.budgets.max_attempts, 1);
        assert_eq!(settings.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn test_parse_run_with_globals() {
        let cli = Cli::try_parse_from([
            "forja",
            "run",
            "Sumar dos números",
            "--output-dir",
            "/tmp/forja",
            "--max-revisor-attempts",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.overrides.output_dir, Some(PathBuf::from("/tmp/forja")));
        assert_eq!(cli.overrides.max_revisor_attempts, Some(3));
        match cli.command {
            Commands::Run(args) => assert_eq!(args.prompt, "Sumar dos números"),
            _ => panic!("expected run"),
        }
    }
}
