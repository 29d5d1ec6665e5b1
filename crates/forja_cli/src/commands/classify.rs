//! Classify command - Decide whether a failing test run blames the tests or the code.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use forja_core::Language;
use forja_runner::{classify, parse_stats, strip_ansi, Classification, TestStats};
use serde_json::json;

use super::analyze::{LanguageArg, OutputFormat};
use crate::error::CliError;

#[derive(Args)]
pub struct ClassifyArgs {
    /// Captured output of the test runner
    pub output_file: PathBuf,

    /// File name of the generated test file (e.g. test_sumar.py)
    #[arg(long)]
    pub test_file: String,

    /// Language of the run (detected from the test file name by default)
    #[arg(short, long, value_enum)]
    pub language: Option<LanguageArg>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

pub async fn execute(args: ClassifyArgs) -> Result<()> {
    if args.test_file.trim().is_empty() {
        return Err(CliError::InvalidArgument("--test-file is empty".to_string()).into());
    }
    let raw = std::fs::read_to_string(&args.output_file)
        .with_context(|| format!("Failed to read {}", args.output_file.display()))?;

    let language = resolve_language(&args)?;
    let (stats, verdict) = inspect(language, &raw, &args.test_file);

    match args.format {
        OutputFormat::Text => {
            println!("🧪 {}", stats.summary());
            println!("   Fault: {}", verdict.kind);
            println!("   Signal: {}", verdict.reason);
        }
        OutputFormat::Json => {
            let body = json!({
                "language": language.as_str(),
                "stats": stats,
                "classification": verdict,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }
    Ok(())
}

fn resolve_language(args: &ClassifyArgs) -> Result<Language> {
    if let Some(lang) = args.language {
        return Ok(lang.into());
    }
    Language::from_path(std::path::Path::new(&args.test_file)).ok_or_else(|| {
        CliError::InvalidArgument(format!(
            "cannot detect the language of {}; pass --language",
            args.test_file
        ))
        .into()
    })
}

fn inspect(language: Language, raw: &str, test_file: &str) -> (TestStats, Classification) {
    let output = strip_ansi(raw);
    (parse_stats(language, &output), classify(language, &output, test_file))
}
