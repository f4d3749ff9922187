// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Run command
//!
//! Starts every agent of an experiment until Ctrl+C, the cost ceiling or a
//! failure, or runs a single tick of one agent with `--tick`.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

use agora_orchestrator_core::application::RunOutcome;
use agora_orchestrator_core::domain::experiment::AgentIndex;

use crate::embedded::EmbeddedServices;

#[derive(Args)]
pub struct RunArgs {
    /// Experiment name
    #[arg(value_name = "EXPERIMENT")]
    pub experiment: String,

    /// Run one tick for a single agent (by index)
    #[arg(short, long, value_name = "AGENT")]
    pub tick: Option<u32>,

    /// Stop once the experiment has spent more than this many dollars
    #[arg(long, value_name = "DOLLARS")]
    pub max_cost: Option<f64>,

    /// Copy a file or directory into every agent's computer
    #[arg(short, long = "path", value_name = "PATH", num_args = 1..)]
    pub paths: Vec<PathBuf>,

    /// Disable extended thinking
    #[arg(long)]
    pub no_thinking: bool,

    /// Disable the computer tool
    #[arg(long)]
    pub no_computer: bool,

    /// Seed reviewer sampling and reference tokens
    #[arg(long)]
    pub seed: Option<u64>,
}

pub async fn handle_command(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    if let Some(max_cost) = args.max_cost {
        validate_max_cost(max_cost)?;
    }

    let services = EmbeddedServices::new(config_path).await?;
    let experiment = services.experiments.find_by_name(&args.experiment).await?;

    let mut options = services.run_options();
    options.thinking = options.thinking && !args.no_thinking;
    options.computer = !args.no_computer;
    options.paths = args.paths;
    options.seed = args.seed;

    if let Some(agent) = args.tick {
        let agent = AgentIndex(agent);
        if !experiment.has_agent(agent) {
            bail!(
                "Invalid agent index: {}. Must be between 0 and {}",
                agent,
                experiment.agent_count.saturating_sub(1)
            );
        }

        let summary = services.experiments.tick(&experiment, agent, &options).await?;
        println!(
            "{}",
            format!(
                "✓ Agent {} tick complete: {} tool calls, {} tokens, ${:.4}",
                agent, summary.tool_calls, summary.usage.total, summary.cost
            )
            .green()
        );
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current ticks");
            interrupt.cancel();
        }
    });

    println!(
        "Running {} agents of {} ({}). Press Ctrl+C to stop.",
        experiment.agent_count,
        experiment.name.bold(),
        experiment.model
    );

    let outcome = services
        .experiments
        .run(&experiment, &options, args.max_cost, cancel)
        .await?;
    let spent = services.experiments.cost(&experiment).await?;

    match outcome {
        RunOutcome::Interrupted => {
            println!("{}", format!("Run interrupted. Total cost: ${:.2}", spent).yellow());
        }
        RunOutcome::CostCeilingReached { spent } => {
            println!("{}", format!("Cost exceeded: ${:.2}. Run stopped.", spent).yellow());
        }
    }

    Ok(())
}

fn validate_max_cost(max_cost: f64) -> Result<()> {
    if !max_cost.is_finite() || max_cost <= 0.0 {
        bail!("Max cost must be a valid number greater than 0");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_max_cost() {
        assert!(validate_max_cost(1.5).is_ok());
        assert!(validate_max_cost(0.0).is_err());
        assert!(validate_max_cost(-2.0).is_err());
        assert!(validate_max_cost(f64::NAN).is_err());
    }
}
