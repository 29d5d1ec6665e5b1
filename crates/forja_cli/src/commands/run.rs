//! Run command - Execute the full pipeline on a prompt.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use forja_agents::{AgentError, AgentServices, Pipeline};
use forja_core::{ExecutionLog, Settings, StepEvent, Target};
use forja_llm::LlmError;
use tokio::sync::mpsc;
use tracing::info;

use crate::error::CliError;

#[derive(Args)]
pub struct RunArgs {
    /// Natural-language description of the function to build
    pub prompt: String,
}

pub async fn execute(args: RunArgs, settings: Settings, quiet: bool) -> Result<()> {
    let prompt = args.prompt.trim();
    if prompt.is_empty() {
        return Err(CliError::InvalidArgument("the prompt is empty".to_string()).into());
    }

    for warning in settings.validate() {
        if !quiet {
            println!("⚠️  {}", warning);
        }
    }

    let output_dir = settings.output_dir.clone();
    let services = AgentServices::from_settings(settings).map_err(setup_error)?;
    let pipeline = Pipeline::new(Arc::new(services));

    info!("Starting pipeline for: {}", prompt);
    if !quiet {
        println!("🔨 Forja");
        println!("   Request: {}", prompt);
        println!("   Artifacts: {}", output_dir.display());
        println!();
    }

    let (sender, mut receiver) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            if !quiet {
                print_event(&event);
            }
        }
    });

    let result = pipeline.run(prompt, Some(sender)).await;
    // The executor owns the sender, so the channel is closed by now.
    let _ = printer.await;
    let log = result.context("Pipeline execution failed")?;

    print_summary(&log, quiet);
    match log.terminal {
        Some(terminal) if log.succeeded() => {
            info!("Pipeline finished: {}", terminal);
            Ok(())
        }
        Some(terminal) => Err(CliError::NonSuccess(terminal).into()),
        None => anyhow::bail!("Pipeline stopped without reaching a terminal"),
    }
}

fn setup_error(e: AgentError) -> anyhow::Error {
    match e {
        AgentError::Llm(LlmError::NotConfigured(msg)) => CliError::Config(msg).into(),
        other => anyhow::Error::new(other).context("Failed to set up the pipeline"),
    }
}

fn describe_target(target: &Target) -> String {
    match target {
        Target::Node(node) => node.to_string(),
        Target::End(terminal) => format!("end ({})", terminal),
    }
}

fn print_event(event: &StepEvent) {
    match event {
        StepEvent::NodeStarted { step, node } => println!("▶ [{}] {}", step, node),
        StepEvent::NodeFinished {
            node,
            changed_fields,
            next,
            ..
        } => {
            if changed_fields.is_empty() {
                println!("   {} → {}", node, describe_target(next));
            } else {
                println!(
                    "   {} updated {} → {}",
                    node,
                    changed_fields.join(", "),
                    describe_target(next)
                );
            }
        }
        StepEvent::Finished { terminal } => println!("🏁 {}", terminal),
        StepEvent::Failed { node, message } => match node {
            Some(node) => eprintln!("❌ {} failed: {}", node, message),
            None => eprintln!("❌ {}", message),
        },
    }
}

fn print_summary(log: &ExecutionLog, quiet: bool) {
    if quiet {
        return;
    }
    let state = &log.state;

    println!();
    println!("📊 Summary");
    println!("   Steps: {}", log.visits.len());
    println!(
        "   Iteration: {}/{}",
        state.counters.attempt.count, state.counters.attempt.max
    );
    if !state.test_summary.is_empty() {
        println!("   Tests: {}", state.test_summary);
    }
    if let Some(score) = state.review_score {
        println!("   Review: {}/10", score);
    }
    if let Some(url) = &state.pr_url {
        println!("   PR: {}", url);
    }
    if !state.stakeholder_feedback.is_empty() {
        println!("   Last feedback: {}", state.stakeholder_feedback);
    }
    println!("   Log: {}", log.log_dir.display());

    if log.succeeded() {
        println!("\n✅ Delivery validated");
    } else {
        println!("\n❌ Delivery not validated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forja_core::{NodeId, Terminal};

    #[test]
    fn test_describe_target() {
        assert_eq!(describe_target(&Target::Node(NodeId::QualityGate)), "QualityGate");
        assert_eq!(
            describe_target(&Target::End(Terminal::MergeFailed)),
            "end (merge-failed)"
        );
    }

    #[test]
    fn test_missing_llm_key_is_a_config_error() {
        let err = setup_error(AgentError::Llm(LlmError::NotConfigured(
            "GEMINI_API_KEY".to_string(),
        )));
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Config(_))));
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected() {
        let args = RunArgs {
            prompt: "   ".to_string(),
        };
        let err = execute(args, Settings::default().with_mock_mode(true), true)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::InvalidArgument(_))
        ));
    }
}
