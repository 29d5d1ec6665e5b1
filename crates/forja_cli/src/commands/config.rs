//! Config command - Print the effective configuration.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use forja_core::Settings;
use forja_runner::{CommandRunner, ProcessRunner, Sandbox};

use crate::error::CliError;

#[derive(Args)]
pub struct ConfigArgs {
    /// Fail when the configuration has warnings
    #[arg(long)]
    pub check: bool,
}

pub async fn execute(args: ConfigArgs, settings: Settings) -> Result<()> {
    report(args, settings, Arc::new(ProcessRunner::default())).await
}

async fn report(args: ConfigArgs, settings: Settings, runner: Arc<dyn CommandRunner>) -> Result<()> {
    let warnings = settings.validate();
    println!("{}", render(&settings)?);

    println!("\n🧰 Toolchain:");
    for (program, available) in Sandbox::new(&settings.output_dir, runner).toolchain().await {
        println!("   {} {}", if available { "✅" } else { "❌" }, program);
    }

    if warnings.is_empty() {
        println!("\n✅ Configuration OK");
        return Ok(());
    }

    println!("\n⚠️  {} warning(s):", warnings.len());
    for warning in &warnings {
        println!("   - {}", warning);
    }
    if args.check {
        return Err(CliError::Config(warnings.join("; ")).into());
    }
    Ok(())
}

/// Pretty JSON of the settings with every secret masked.
fn render(settings: &Settings) -> Result<String> {
    Ok(serde_json::to_string_pretty(&settings.redacted())?)
}
