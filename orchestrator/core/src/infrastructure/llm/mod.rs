// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Infrastructure - Anti-Corruption Layer Implementations
//
// Each adapter translates the uniform conversation model (messages, tool
// calls, tool results) to one vendor API and back, and reports token usage.

pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod registry;

pub use registry::{ProviderRegistry, RetryingProvider};

use reqwest::StatusCode;

use crate::domain::llm::{LLMError, ModelPricing};
use crate::domain::node_config::ModelConfig;

/// Per-model settings shared by all adapters
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub context_window: u64,
    pub max_output_tokens: u32,
    pub pricing: ModelPricing,
}

impl From<&ModelConfig> for ModelSettings {
    fn from(config: &ModelConfig) -> Self {
        Self {
            model: config.model.clone(),
            context_window: config.context_window as u64,
            max_output_tokens: config.max_output_tokens,
            pricing: config.pricing(),
        }
    }
}

/// Map a non-success HTTP status onto the provider error taxonomy
pub(crate) fn status_error(status: StatusCode, body: String, model: &str) -> LLMError {
    match status.as_u16() {
        401 | 403 => LLMError::Authentication(body),
        404 => LLMError::ModelNotFound(model.to_string()),
        429 => LLMError::RateLimit,
        _ => LLMError::Provider(format!("HTTP {}: {}", status, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "no".into(), "m"),
            LLMError::Authentication(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, String::new(), "m"),
            LLMError::ModelNotFound(m) if m == "m"
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, String::new(), "m"),
            LLMError::RateLimit
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, String::new(), "m"),
            LLMError::Provider(_)
        ));
    }
}
