//! Forja CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Configuration error
//! - 4: Fatal LLM error
//! - 5: Workflow ended without success

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod error;

use commands::{Cli, Commands};
use error::CliError;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const CONFIG_ERROR: u8 = 3;
    pub const LLM_FATAL: u8 = 4;
    pub const NON_SUCCESS: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = cli.overrides.load();

    let log_file = match &cli.command {
        Commands::Run(_) => Some(settings.output_dir.join("logs")),
        _ => None,
    };
    let level = if cli.verbose {
        "debug"
    } else {
        settings.log_level.as_str()
    };
    let log_path = match init_logging(level, cli.quiet, log_file.as_deref()) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Warning: file logging disabled: {:#}", e);
            None
        }
    };
    if let Some(path) = &log_path {
        tracing::info!("Logging to {}", path.display());
    }

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, settings, cli.quiet).await,
        Commands::Analyze(args) => commands::analyze::execute(args).await,
        Commands::Classify(args) => commands::classify::execute(args).await,
        Commands::Config(args) => commands::config::execute(args, settings).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Install the console layer and, when a log directory is given, a file
/// layer writing `workflow_<timestamp>.log` into it.
///
/// `RUST_LOG` wins over the configured level.
fn init_logging(level: &str, quiet: bool, log_dir: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    let filter = || {
        let base = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        match "forja=info".parse() {
            Ok(directive) => base.add_directive(directive),
            Err(_) => base,
        }
    };

    let console = if quiet {
        None
    } else {
        Some(fmt::layer().with_target(false).with_filter(filter()))
    };

    let (file_layer, path) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let path = dir.join(format!(
                "workflow_{}.log",
                chrono::Local::now().format("%Y%m%d_%H%M%S")
            ));
            let file = File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(filter());
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    // A second initialization (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init();
    Ok(path)
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(cli_error) = e.downcast_ref::<CliError>() {
        return match cli_error {
            CliError::Config(_) => ExitCodes::CONFIG_ERROR,
            CliError::InvalidArgument(_) => ExitCodes::INVALID_ARGS,
            CliError::NonSuccess(_) | CliError::GateFailed(_) => ExitCodes::NON_SUCCESS,
        };
    }

    let msg = format!("{:#}", e).to_lowercase();
    if msg.contains("llm error") || msg.contains("llm not configured") || msg.contains("model not found") {
        ExitCodes::LLM_FATAL
    } else if msg.contains("configuration") || msg.contains("config error") {
        ExitCodes::CONFIG_ERROR
    } else if msg.contains("argument") || msg.contains("not found") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
