// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedded services
//!
//! Every command runs in-process: configuration is loaded, the record store
//! is connected (and migrated) and the experiment service is wired on top.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use agora_orchestrator_core::{
    application::{CostCheckPolicy, ExperimentService, Repositories, RunOptions},
    domain::{
        node_config::{NodeConfig, SandboxConfig},
        sandbox::Sandbox,
    },
    infrastructure::{llm::ProviderRegistry, DockerSandbox},
};

pub struct EmbeddedServices {
    pub config: NodeConfig,
    pub registry: Arc<ProviderRegistry>,
    pub experiments: ExperimentService,
}

impl EmbeddedServices {
    pub async fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config = load_config(config_path)?;

        let repos = Repositories::from_config(&config.spec.storage)
            .await
            .context("Failed to initialize storage")?;
        let registry = Arc::new(ProviderRegistry::from_config(&config));
        let sandbox = docker_sandbox(&config.spec.sandbox);
        let experiments = ExperimentService::new(repos, registry.clone(), sandbox);

        Ok(Self {
            config,
            registry,
            experiments,
        })
    }

    /// Run options seeded from the `run` and `sandbox` sections
    pub fn run_options(&self) -> RunOptions {
        run_options(&self.config)
    }
}

/// Load and validate configuration
pub fn load_config(config_path: Option<PathBuf>) -> Result<NodeConfig> {
    let config = NodeConfig::load_or_default(config_path).context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

pub fn run_options(config: &NodeConfig) -> RunOptions {
    let run = &config.spec.run;
    RunOptions {
        thinking: run.thinking,
        computer: true,
        reviewers: run.reviewers,
        command_timeout: Duration::from_secs(config.spec.sandbox.command_timeout_seconds),
        seed: None,
        paths: Vec::new(),
        cost_policy: CostCheckPolicy {
            interval: run.cost_check_interval,
            ratio: run.cost_check_ratio,
        },
    }
}

fn docker_sandbox(config: &SandboxConfig) -> Option<Arc<dyn Sandbox>> {
    match DockerSandbox::new(
        config.docker_socket_path.clone(),
        &config.profiles_dir,
        config.network_mode.clone(),
    ) {
        Ok(sandbox) => Some(Arc::new(sandbox)),
        Err(e) => {
            warn!(error = %e, "Docker unavailable, the computer tool is disabled");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_options_follow_config() {
        let mut config = NodeConfig::default();
        config.spec.run.reviewers = Some(2);
        config.spec.run.thinking = false;
        config.spec.run.cost_check_interval = 5;
        config.spec.sandbox.command_timeout_seconds = 30;

        let options = run_options(&config);
        assert_eq!(options.reviewers, Some(2));
        assert!(!options.thinking);
        assert!(options.computer);
        assert_eq!(options.cost_policy.interval, 5);
        assert_eq!(options.command_timeout, Duration::from_secs(30));
    }
}
