// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Registry - Model Alias Resolution and Provider Management
//
// Resolves the model alias an experiment names to a provider adapter with
// its pricing. Every call builds a fresh adapter, so agents never share a
// provider connection. Adapters are wrapped in a retry layer.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::anthropic::AnthropicAdapter;
use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;
use super::ModelSettings;
use crate::domain::llm::{
    LLMError, LLMProvider, LLMProviderFactory, Message, ModelPricing, ModelResponse, TokenUsage,
    ToolDefinition,
};
use crate::domain::node_config::{LLMProviderConfig, LLMSelection, ModelConfig, NodeConfig};

const SUPPORTED_TYPES: &[&str] = &["anthropic", "openai", "openai-compatible", "ollama"];

/// One configured model alias
#[derive(Debug, Clone)]
pub struct ModelSummary {
    pub alias: String,
    pub provider: String,
    pub model: String,
    pub context_window: u32,
    pub pricing: ModelPricing,
}

/// Registry for managing LLM providers and resolving model aliases
pub struct ProviderRegistry {
    alias_map: HashMap<String, (LLMProviderConfig, ModelConfig)>,
    selection: LLMSelection,
}

impl ProviderRegistry {
    /// Create provider registry from node configuration
    pub fn from_config(config: &NodeConfig) -> Self {
        let mut alias_map = HashMap::new();

        for provider_config in &config.spec.llm_providers {
            if !provider_config.enabled {
                info!("Provider '{}' disabled, skipping", provider_config.name);
                continue;
            }
            if !SUPPORTED_TYPES.contains(&provider_config.provider_type.as_str()) {
                warn!(
                    "Unsupported provider type '{}' for '{}', skipping",
                    provider_config.provider_type, provider_config.name
                );
                continue;
            }

            for model_config in &provider_config.models {
                debug!(
                    "Mapping alias '{}' -> {} ({})",
                    model_config.alias, model_config.model, provider_config.name
                );
                alias_map.insert(
                    model_config.alias.clone(),
                    (provider_config.clone(), model_config.clone()),
                );
            }
        }

        if alias_map.is_empty() {
            warn!("No LLM providers configured");
        }

        Self {
            alias_map,
            selection: config.spec.llm_selection.clone(),
        }
    }

    /// Build a provider for `alias`
    fn build(&self, alias: &str, thinking: bool) -> Result<Arc<dyn LLMProvider>, LLMError> {
        let (provider_config, model_config) = self
            .alias_map
            .get(alias)
            .ok_or_else(|| LLMError::ModelNotFound(format!("Model alias '{}' not found", alias)))?;

        let api_key = Self::resolve_api_key(&provider_config.api_key)?;
        let endpoint = provider_config.endpoint.clone();
        let settings = ModelSettings::from(model_config);

        let provider: Arc<dyn LLMProvider> = match provider_config.provider_type.as_str() {
            "anthropic" => Arc::new(AnthropicAdapter::new(endpoint, api_key, settings, thinking)),
            "openai" | "openai-compatible" => Arc::new(OpenAIAdapter::new(endpoint, api_key, settings)),
            "ollama" => Arc::new(OllamaAdapter::new(endpoint, settings)),
            other => {
                return Err(LLMError::InvalidInput(format!("Unsupported provider type: {}", other)));
            }
        };

        Ok(Arc::new(RetryingProvider::new(
            provider,
            self.selection.max_retries,
            Duration::from_millis(self.selection.retry_delay_ms),
        )))
    }

    /// Resolve API key from config (supports "env:VAR_NAME" syntax)
    fn resolve_api_key(key: &Option<String>) -> Result<String, LLMError> {
        match key.as_deref() {
            Some(k) => match k.strip_prefix("env:") {
                Some(var_name) => std::env::var(var_name).map_err(|_| {
                    LLMError::Authentication(format!("Environment variable not set: {}", var_name))
                }),
                None => Ok(k.to_string()),
            },
            None => Ok(String::new()), // For local providers without auth
        }
    }

    /// Configured aliases, sorted
    pub fn models(&self) -> Vec<ModelSummary> {
        let mut models: Vec<ModelSummary> = self
            .alias_map
            .iter()
            .map(|(alias, (provider, model))| ModelSummary {
                alias: alias.clone(),
                provider: provider.name.clone(),
                model: model.model.clone(),
                context_window: model.context_window,
                pricing: model.pricing(),
            })
            .collect();
        models.sort_by(|a, b| a.alias.cmp(&b.alias));
        models
    }
}

impl LLMProviderFactory for ProviderRegistry {
    fn has_model(&self, alias: &str) -> bool {
        self.alias_map.contains_key(alias)
    }

    fn create(&self, alias: &str, thinking: bool) -> Result<Arc<dyn LLMProvider>, LLMError> {
        self.build(alias, thinking)
    }
}

/// Retries transient provider failures with exponential backoff
pub struct RetryingProvider {
    inner: Arc<dyn LLMProvider>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn LLMProvider>, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            inner,
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    fn is_transient(error: &LLMError) -> bool {
        matches!(error, LLMError::Network(_) | LLMError::RateLimit | LLMError::Provider(_))
    }
}

#[async_trait]
impl LLMProvider for RetryingProvider {
    async fn run(
        &self,
        messages: &[Message],
        system_prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LLMError> {
        let mut attempt = 0;
        loop {
            match self.inner.run(messages, system_prompt, tools).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt + 1 < self.max_retries && Self::is_transient(&e) => {
                    warn!(
                        "Generation failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    // Exponential backoff
                    tokio::time::sleep(self.retry_delay * 2_u32.pow(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn tokens(&self, messages: &[Message]) -> Result<u64, LLMError> {
        self.inner.tokens(messages).await
    }

    fn cost(&self, usages: &[TokenUsage]) -> f64 {
        self.inner.cost(usages)
    }

    fn max_context_tokens(&self) -> u64 {
        self.inner.max_context_tokens()
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        self.inner.health_check().await
    }
}
