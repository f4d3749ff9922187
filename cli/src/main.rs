// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Agora CLI
//!
//! The `agora` binary creates research experiments and runs their agent
//! societies in-process.
//!
//! ## Commands
//!
//! - `agora experiment create|list|show|clean` - Experiment management
//! - `agora run <experiment>` - Run all agents, or one tick with `--tick`
//! - `agora models` - Configured model aliases and pricing
//! - `agora config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use agora::commands::{self, ConfigCommand, ExperimentCommand, RunArgs};
use agora_orchestrator_core::domain::node_config::NodeConfig;

/// Agora - run societies of research agents that publish and peer-review
#[derive(Parser)]
#[command(name = "agora")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "AGORA_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true, env = "AGORA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true, env = "AGORA_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Experiment management
    #[command(name = "experiment")]
    Experiment {
        #[command(subcommand)]
        command: ExperimentCommand,
    },

    /// Run the agents of an experiment
    #[command(name = "run")]
    Run(RunArgs),

    /// List configured model aliases
    #[command(name = "models")]
    Models,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Provider keys are usually referenced as env:VAR
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Flags win over the config file's logging section
    let logging = NodeConfig::load_or_default(cli.config.clone())
        .map(|config| config.logging())
        .unwrap_or_default();
    init_logging(
        cli.log_level.as_deref().unwrap_or(&logging.level),
        cli.log_format.as_deref().unwrap_or(&logging.format),
    )?;

    match cli.command {
        Commands::Experiment { command } => {
            commands::experiment::handle_command(command, cli.config).await
        }
        Commands::Run(args) => commands::run::handle_command(args, cli.config).await,
        Commands::Models => commands::models::handle_command(cli.config).await,
        Commands::Config { command } => {
            commands::config::handle_command(command, cli.config).await
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        "json" => builder.json().init(),
        "text" => builder.compact().init(),
        other => anyhow::bail!("Unknown log format '{}'. Expected text or json", other),
    }

    Ok(())
}
