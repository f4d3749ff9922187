// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use agora_orchestrator_core::domain::node_config::{NodeConfig, StorageBackendKind};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./agora-config.yaml)
        #[arg(short, long, default_value = "./agora-config.yaml")]
        output: PathBuf,

        /// Include every provider type with comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = NodeConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. AGORA_CONFIG_PATH: {}",
            std::env::var("AGORA_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./agora-config.yaml");
        println!("  4. ~/.agora/config.yaml");
        println!("  5. /etc/agora/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Node:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    // LLM providers
    println!("{}", "LLM Providers:".bold());
    for provider in &config.spec.llm_providers {
        let state = if provider.enabled { "" } else { " [disabled]" };
        println!("  {} ({}){}", provider.name.bold(), provider.provider_type, state);
        println!("    Endpoint: {}", provider.endpoint);
        println!("    Models: {}", provider.models.len());
        for model in &provider.models {
            println!("      - {} → {}", model.alias, model.model);
        }
    }
    println!();

    println!("{}", "LLM Retries:".bold());
    println!("  Max attempts: {}", config.spec.llm_selection.max_retries);
    println!("  Base delay: {}ms", config.spec.llm_selection.retry_delay_ms);
    println!();

    let storage = &config.spec.storage;
    println!("{}", "Storage:".bold());
    match storage.backend {
        StorageBackendKind::InMemory => println!("  Backend: in-memory"),
        StorageBackendKind::Postgres => {
            println!("  Backend: postgres");
            println!(
                "  Database: {}",
                storage.database_url.as_deref().map(redact_url).unwrap_or_else(|| "(none)".to_string())
            );
        }
    }
    println!("  Content root: {}", storage.content_root);
    println!();

    let sandbox = &config.spec.sandbox;
    println!("{}", "Sandbox:".bold());
    println!(
        "  Docker socket: {}",
        sandbox.docker_socket_path.as_deref().unwrap_or("(auto)")
    );
    println!("  Profiles: {}", sandbox.profiles_dir);
    println!("  Command timeout: {}s", sandbox.command_timeout_seconds);
    if let Some(network) = &sandbox.network_mode {
        println!("  Network: {}", network);
    }
    println!();

    let run = &config.spec.run;
    println!("{}", "Run:".bold());
    match run.reviewers {
        Some(reviewers) => println!("  Reviewers: {}", reviewers),
        None => println!("  Reviewers: {}", "(derived from agent count)".dimmed()),
    }
    println!("  Thinking: {}", run.thinking);
    println!(
        "  Cost check: every {} ticks, every tick above {:.0}% of the ceiling",
        run.cost_check_interval,
        run.cost_check_ratio * 100.0
    );
    println!();

    let logging = config.logging();
    println!("{}", "Logging:".bold());
    println!("  Level: {}", logging.level);
    println!("  Format: {}", logging.format);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = NodeConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

/// Hide the password of a connection string
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme), Some(at)) if at > scheme => {
            let credentials = &url[scheme + 3..at];
            match credentials.split_once(':') {
                Some((user, _)) => format!("{}{}:****{}", &url[..scheme + 3], user, &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("postgres://agora:secret@db:5432/agora"),
            "postgres://agora:****@db:5432/agora"
        );
        assert_eq!(
            redact_url("postgres://postgres@localhost/agora"),
            "postgres://postgres@localhost/agora"
        );
    }

    #[test]
    fn test_templates_parse_and_validate() {
        for sample in [
            include_str!("../../templates/config-minimal.yaml"),
            include_str!("../../templates/config-with-examples.yaml"),
        ] {
            let config = NodeConfig::from_yaml_str(sample).unwrap();
            config.validate().unwrap();
        }
    }
}
