// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Llm
//!
//! Provides the language-model contract the tick scheduler drives.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Conversation model, tool definitions, token accounting and
//!   the provider interface

// LLM Provider Domain Interface (Anti-Corruption Layer)
//
// Vendor request/response translation lives in infrastructure/llm/. The
// scheduler only sees the uniform message model below.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::Arc;

/// Domain interface for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Run one completion over the full history with the enabled tool set
    async fn run(
        &self,
        messages: &[Message],
        system_prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LLMError>;

    /// Approximate prompt size of `messages` in tokens
    async fn tokens(&self, messages: &[Message]) -> Result<u64, LLMError>;

    /// Dollar cost of the given usages at this provider's pricing
    fn cost(&self, usages: &[TokenUsage]) -> f64;

    /// Context window of the configured model
    fn max_context_tokens(&self) -> u64;

    /// Check if provider is healthy and accessible
    async fn health_check(&self) -> Result<(), LLMError>;
}

/// Builds a dedicated provider for a model alias
pub trait LLMProviderFactory: Send + Sync {
    fn has_model(&self, alias: &str) -> bool;

    fn create(&self, alias: &str, thinking: bool) -> Result<Arc<dyn LLMProvider>, LLMError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<Content>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![Content::text(text)],
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![Content::text(text)],
        }
    }

    /// Tool calls requested in this message as `(id, name, input)`
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &serde_json::Value)> {
        self.content.iter().filter_map(|c| match c {
            Content::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
            _ => None,
        })
    }

    pub fn has_tool_uses(&self) -> bool {
        self.tool_uses().next().is_some()
    }

    /// Whether this user turn answers tool calls
    pub fn is_tool_results(&self) -> bool {
        self.role == Role::User
            && self
                .content
                .iter()
                .any(|c| matches!(c, Content::ToolResult { .. }))
    }

    /// Rough character count used for token estimation
    pub fn char_len(&self) -> usize {
        self.content
            .iter()
            .map(|c| match c {
                Content::Text { text } => text.len(),
                Content::Thinking { thinking, .. } => thinking.len(),
                Content::ToolUse { name, input, .. } => name.len() + input.to_string().len(),
                Content::ToolResult { content, .. } => content.len(),
            })
            .sum()
    }
}

/// Character-based estimate (four characters per token) for providers without
/// a counting endpoint.
pub fn approximate_tokens(messages: &[Message]) -> u64 {
    let chars: usize = messages.iter().map(Message::char_len).sum();
    chars.div_ceil(4) as u64
}

/// Tool advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool arguments
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub total: u64,
    pub input: u64,
    pub output: u64,
    pub cached: u64,
    pub thinking: u64,
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: Self) -> Self::Output {
        TokenUsage {
            total: self.total + rhs.total,
            input: self.input + rhs.input,
            output: self.output + rhs.output,
            cached: self.cached + rhs.cached,
            thinking: self.thinking + rhs.thinking,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for TokenUsage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(TokenUsage::default(), Add::add)
    }
}

/// Prices in USD per million tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    /// Cost of `usages`; thinking tokens are billed as output.
    pub fn cost(&self, usages: &[TokenUsage]) -> f64 {
        let total: TokenUsage = usages.iter().copied().sum();
        (total.input as f64 * self.input_per_million
            + total.output as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// Assistant turn including any tool calls
    pub message: Message,

    /// Token usage stats
    pub usage: TokenUsage,
}

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_sum() {
        let a = TokenUsage { total: 30, input: 20, output: 10, cached: 5, thinking: 2 };
        let b = TokenUsage { total: 3, input: 2, output: 1, cached: 0, thinking: 0 };
        let sum: TokenUsage = [a, b].into_iter().sum();
        assert_eq!(sum.total, 33);
        assert_eq!(sum.cached, 5);
    }

    #[test]
    fn test_pricing_cost() {
        let pricing = ModelPricing { input_per_million: 3.0, output_per_million: 15.0 };
        let usage = TokenUsage {
            total: 2_000_000,
            input: 1_000_000,
            output: 1_000_000,
            cached: 0,
            thinking: 0,
        };
        assert!((pricing.cost(&[usage]) - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_message_serde_shape() {
        let message = Message {
            role: Role::Assistant,
            content: vec![Content::ToolUse {
                id: "call_1".into(),
                name: "publications-list_publications".into(),
                input: serde_json::json!({"order": "latest"}),
            }],
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"][0]["type"], "tool_use");
        assert!(message.has_tool_uses());
    }

    #[test]
    fn test_approximate_tokens() {
        let messages = vec![Message::user_text("abcdefgh"), Message::assistant_text("abc")];
        assert_eq!(approximate_tokens(&messages), 3);
    }
}
