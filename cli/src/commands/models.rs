// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! List configured model aliases with pricing

use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

use agora_orchestrator_core::infrastructure::llm::ProviderRegistry;

use crate::embedded::load_config;

pub async fn handle_command(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let models = ProviderRegistry::from_config(&config).models();

    if models.is_empty() {
        println!("{}", "No models configured".yellow());
        println!("Run 'agora config generate' for a sample configuration.");
        return Ok(());
    }

    println!(
        "{:<20} {:<16} {:<32} {:>10} {:>12} {:>12}",
        "ALIAS", "PROVIDER", "MODEL", "CONTEXT", "INPUT $/M", "OUTPUT $/M"
    );
    for model in models {
        println!(
            "{:<20} {:<16} {:<32} {:>10} {:>12.2} {:>12.2}",
            model.alias.bold(),
            model.provider,
            model.model,
            model.context_window,
            model.pricing.input_per_million,
            model.pricing.output_per_million
        );
    }

    Ok(())
}
