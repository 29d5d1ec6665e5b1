//! Analyze command - Run the local static analyzer on a file or directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use forja_core::Language;
use forja_policy::{format_report, AcceptanceRule, FindingsReport, GateResult, LocalAnalyzer};
use serde_json::json;
use tracing::info;

use crate::error::CliError;

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Source file, or directory of source files, to analyze
    pub file: PathBuf,

    /// Language of the file (detected from the extension by default)
    #[arg(short, long, value_enum)]
    pub language: Option<LanguageArg>,

    /// Glob of paths to skip when analyzing a directory
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LanguageArg {
    #[value(alias = "typescript")]
    Ts,
    #[value(alias = "python")]
    Py,
}

impl From<LanguageArg> for Language {
    fn from(arg: LanguageArg) -> Self {
        match arg {
            LanguageArg::Ts => Language::TypeScript,
            LanguageArg::Py => Language::Python,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub async fn execute(args: AnalyzeArgs) -> Result<()> {
    if !args.file.exists() {
        return Err(CliError::InvalidArgument(format!(
            "path not found: {}",
            args.file.display()
        ))
        .into());
    }

    let (report, gate) = analyze(&args)?;
    info!(
        "Analyzed {}: {} issues, gate {}",
        args.file.display(),
        report.issues.len(),
        if gate.passed { "passed" } else { "failed" }
    );

    match args.format {
        OutputFormat::Text => println!("{}", format_report(&report, &gate)),
        OutputFormat::Json => {
            let body = json!({
                "file": args.file.display().to_string(),
                "report": report,
                "gate": gate,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    if gate.passed {
        Ok(())
    } else {
        Err(CliError::GateFailed(args.file.display().to_string()).into())
    }
}

fn analyze(args: &AnalyzeArgs) -> Result<(FindingsReport, GateResult)> {
    let mut analyzer = LocalAnalyzer::new().context("Failed to build the analyzer")?;

    let report = if args.file.is_dir() {
        for pattern in &args.exclude {
            analyzer = analyzer
                .with_exclude(pattern)
                .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        }
        analyzer
            .analyze_path(&args.file)
            .with_context(|| format!("Failed to analyze {}", args.file.display()))?
    } else {
        analyze_file(&analyzer, args)?
    };

    let gate = AcceptanceRule::default().evaluate(&report);
    Ok((report, gate))
}

fn analyze_file(analyzer: &LocalAnalyzer, args: &AnalyzeArgs) -> Result<FindingsReport> {
    let language = match args.language {
        Some(lang) => Language::from(lang),
        None => Language::from_path(&args.file).ok_or_else(|| {
            CliError::InvalidArgument(format!(
                "cannot detect the language of {}; pass --language",
                args.file.display()
            ))
        })?,
    };

    analyzer
        .analyze_file(&args.file, Some(language))
        .with_context(|| format!("Failed to analyze {}", args.file.display()))
}
