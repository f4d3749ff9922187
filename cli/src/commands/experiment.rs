// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Experiment management commands
//!
//! Commands: create, list, show, clean

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::Confirm;
use std::path::PathBuf;

use agora_orchestrator_core::domain::experiment::{Experiment, Profile};

use crate::embedded::EmbeddedServices;

const PROBLEM_PREVIEW: usize = 32;

#[derive(Subcommand)]
pub enum ExperimentCommand {
    /// Create a new experiment
    Create {
        /// Experiment name
        #[arg(value_name = "NAME")]
        name: String,

        /// Problem description file
        #[arg(short, long, value_name = "PROBLEM_FILE")]
        problem: PathBuf,

        /// Model alias used by every agent
        #[arg(short, long, default_value = "default")]
        model: String,

        /// Number of agents
        #[arg(short = 'n', long, default_value_t = 1)]
        agent_count: u32,

        /// Sandbox profile (research, formal-math, security)
        #[arg(long, default_value = "research")]
        profile: Profile,
    },

    /// List all experiments
    List,

    /// Show an experiment with its usage, top publications and solutions
    Show {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Delete an experiment and everything it produced
    Clean {
        #[arg(value_name = "NAME")]
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

pub async fn handle_command(command: ExperimentCommand, config_path: Option<PathBuf>) -> Result<()> {
    let services = EmbeddedServices::new(config_path).await?;

    match command {
        ExperimentCommand::Create {
            name,
            problem,
            model,
            agent_count,
            profile,
        } => create(&services, name, problem, model, agent_count, profile).await,
        ExperimentCommand::List => list(&services).await,
        ExperimentCommand::Show { name } => show(&services, &name).await,
        ExperimentCommand::Clean { name, yes } => clean(&services, &name, yes).await,
    }
}

async fn create(
    services: &EmbeddedServices,
    name: String,
    problem: PathBuf,
    model: String,
    agent_count: u32,
    profile: Profile,
) -> Result<()> {
    println!("Creating experiment: {}", name.bold());

    let problem = std::fs::read_to_string(&problem)
        .with_context(|| format!("Failed to read problem file: {:?}", problem))?;

    let experiment = services
        .experiments
        .create(&name, &problem, &model, agent_count, profile)
        .await?;

    println!("{}", format!("✓ Experiment {} created", experiment.name).green());
    print_table(&[experiment]);
    Ok(())
}

async fn list(services: &EmbeddedServices) -> Result<()> {
    let experiments = services.experiments.list().await?;

    if experiments.is_empty() {
        println!("{}", "No experiments found".yellow());
        return Ok(());
    }

    println!("{} experiments found:", experiments.len());
    print_table(&experiments);
    Ok(())
}

async fn show(services: &EmbeddedServices, name: &str) -> Result<()> {
    let experiment = services.experiments.find_by_name(name).await?;
    let summary = services.experiments.summary(&experiment).await?;

    println!("{}", "Experiment:".bold());
    println!("  Name: {}", experiment.name);
    println!("  Model: {}", experiment.model);
    println!("  Agents: {}", experiment.agent_count);
    println!("  Profile: {}", experiment.profile);
    println!("  Created: {}", experiment.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!();
    println!("{}", "Problem:".bold());
    for line in experiment.problem.lines() {
        println!("  {}", line);
    }
    println!();

    println!("{}", "Usage:".bold());
    println!(
        "  Tokens: {} (input {}, output {}, cached {}, thinking {})",
        summary.usage.total,
        summary.usage.input,
        summary.usage.output,
        summary.usage.cached,
        summary.usage.thinking
    );
    println!("  Cost: ${:.2}", summary.cost);
    println!();

    println!("{}", "Most cited publications:".bold());
    if summary.top_publications.is_empty() {
        println!("  {}", "(none published)".dimmed());
    }
    for (publication, citations) in &summary.top_publications {
        println!(
            "  [{}] {} {} ({} citations)",
            publication.reference,
            publication.title.bold(),
            format!("by Agent {}", publication.author).dimmed(),
            citations
        );
    }
    println!();

    println!("{}", "Solutions:".bold());
    if summary.solutions.is_empty() {
        println!("  {}", "(no votes)".dimmed());
    }
    for resolved in &summary.solutions {
        println!(
            "  Agent {} -> [{}] {}",
            resolved.solution.agent,
            resolved.publication.reference,
            resolved.publication.title
        );
    }

    Ok(())
}

async fn clean(services: &EmbeddedServices, name: &str, yes: bool) -> Result<()> {
    let experiment = services.experiments.find_by_name(name).await?;

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete experiment '{}' with all publications, reviews, messages and sandboxes?",
                experiment.name
            ))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("{}", "Aborted".yellow());
            return Ok(());
        }
    }

    services.experiments.clean(name).await?;
    println!("{}", format!("✓ Experiment {} removed", name).green());
    Ok(())
}

fn print_table(experiments: &[Experiment]) {
    println!(
        "{:<24} {:<20} {:<7} {:<12} {:<20} {}",
        "NAME", "MODEL", "AGENTS", "PROFILE", "CREATED", "PROBLEM"
    );
    for experiment in experiments {
        println!(
            "{:<24} {:<20} {:<7} {:<12} {:<20} {}",
            experiment.name.bold(),
            experiment.model,
            experiment.agent_count,
            experiment.profile.as_str(),
            experiment.created_at.format("%Y-%m-%d %H:%M").to_string(),
            preview(&experiment.problem)
        );
    }
}

/// First characters of a problem statement on one line
fn preview(problem: &str) -> String {
    let flat = problem.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > PROBLEM_PREVIEW {
        let head: String = flat.chars().take(PROBLEM_PREVIEW).collect();
        format!("{}...", head)
    } else {
        flat
    }
}
