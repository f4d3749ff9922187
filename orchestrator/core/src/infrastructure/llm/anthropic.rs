// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Anthropic LLM Provider Adapter
//
// Anti-Corruption Layer for the Anthropic Messages API, with optional
// extended thinking.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{status_error, ModelSettings};
use crate::domain::llm::{
    Content, LLMError, LLMProvider, Message, ModelResponse, Role, TokenUsage, ToolDefinition,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    settings: ModelSettings,
    thinking: bool,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
}

#[derive(Serialize)]
struct CountTokensRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct ThinkingConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

#[derive(Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<OutgoingBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutgoingBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        signature: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<IncomingBlock>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IncomingBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    cache_creation_input_tokens: Option<u64>,
}

#[derive(Deserialize)]
struct CountTokensResponse {
    input_tokens: u64,
}

impl AnthropicAdapter {
    pub fn new(endpoint: String, api_key: String, settings: ModelSettings, thinking: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            settings,
            thinking,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint.trim_end_matches('/'), path)
    }

    fn translate(messages: &[Message]) -> Vec<AnthropicMessage> {
        messages
            .iter()
            .map(|message| AnthropicMessage {
                role: match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: message
                    .content
                    .iter()
                    .filter_map(|c| match c {
                        Content::Text { text } => Some(OutgoingBlock::Text { text: text.clone() }),
                        // Unsigned thinking came from another vendor and cannot be replayed
                        Content::Thinking { thinking, signature } => {
                            signature.as_ref().map(|signature| OutgoingBlock::Thinking {
                                thinking: thinking.clone(),
                                signature: signature.clone(),
                            })
                        }
                        Content::ToolUse { id, name, input } => Some(OutgoingBlock::ToolUse {
                            id: id.clone(),
                            name: name.clone(),
                            input: input.clone(),
                        }),
                        Content::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                            ..
                        } => Some(OutgoingBlock::ToolResult {
                            tool_use_id: tool_use_id.clone(),
                            content: content.clone(),
                            is_error: *is_error,
                        }),
                    })
                    .collect(),
            })
            .collect()
    }

    fn thinking_config(&self) -> Option<ThinkingConfig> {
        let budget = self.settings.max_output_tokens / 2;
        (self.thinking && budget >= 1024).then_some(ThinkingConfig {
            kind: "enabled",
            budget_tokens: budget,
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response, LLMError> {
        let response = self
            .client
            .post(self.url(path))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, error_text, &self.settings.model));
        }
        Ok(response)
    }
}

#[async_trait]
impl LLMProvider for AnthropicAdapter {
    async fn run(
        &self,
        messages: &[Message],
        system_prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LLMError> {
        let request = AnthropicRequest {
            model: &self.settings.model,
            max_tokens: self.settings.max_output_tokens,
            system: system_prompt,
            messages: Self::translate(messages),
            tools: tools
                .iter()
                .map(|t| AnthropicTool {
                    name: &t.name,
                    description: &t.description,
                    input_schema: &t.input_schema,
                })
                .collect(),
            thinking: self.thinking_config(),
        };

        let anthropic_response: AnthropicResponse = self
            .post("/v1/messages", &request)
            .await?
            .json()
            .await
            .map_err(|e| LLMError::Provider(format!("Failed to parse response: {}", e)))?;

        let mut content = Vec::new();
        let mut thinking_chars = 0;
        for block in anthropic_response.content {
            match block {
                IncomingBlock::Text { text } => content.push(Content::Text { text }),
                IncomingBlock::Thinking { thinking, signature } => {
                    thinking_chars += thinking.len();
                    content.push(Content::Thinking { thinking, signature });
                }
                IncomingBlock::ToolUse { name, .. } if name.is_empty() => {
                    warn!(model = %self.settings.model, "Dropping tool call without a name");
                }
                IncomingBlock::ToolUse { id, name, input } => content.push(Content::ToolUse { id, name, input }),
                IncomingBlock::Other => {}
            }
        }

        let usage = &anthropic_response.usage;
        let cached = usage.cache_read_input_tokens.unwrap_or(0) + usage.cache_creation_input_tokens.unwrap_or(0);
        let input = usage.input_tokens + cached;
        // Thinking tokens are billed inside output_tokens; the split is estimated
        let thinking = ((thinking_chars as u64).div_ceil(4)).min(usage.output_tokens);

        Ok(ModelResponse {
            message: Message {
                role: Role::Assistant,
                content,
            },
            usage: TokenUsage {
                total: input + usage.output_tokens,
                input,
                output: usage.output_tokens,
                cached,
                thinking,
            },
        })
    }

    async fn tokens(&self, messages: &[Message]) -> Result<u64, LLMError> {
        let request = CountTokensRequest {
            model: &self.settings.model,
            messages: Self::translate(messages),
        };
        let counted: CountTokensResponse = self
            .post("/v1/messages/count_tokens", &request)
            .await?
            .json()
            .await
            .map_err(|e| LLMError::Provider(format!("Failed to parse token count: {}", e)))?;
        Ok(counted.input_tokens)
    }

    fn cost(&self, usages: &[TokenUsage]) -> f64 {
        self.settings.pricing.cost(usages)
    }

    fn max_context_tokens(&self) -> u64 {
        self.settings.context_window
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        let response = self
            .client
            .get(self.url("/v1/models"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else if response.status() == 401 || response.status() == 403 {
            Err(LLMError::Authentication("Invalid API key".into()))
        } else {
            Err(LLMError::Network(format!("HTTP {}", response.status())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::ModelPricing;

    fn settings() -> ModelSettings {
        ModelSettings {
            model: "claude-test".to_string(),
            context_window: 200_000,
            max_output_tokens: 8192,
            pricing: ModelPricing {
                input_per_million: 3.0,
                output_per_million: 15.0,
            },
        }
    }

    #[tokio::test]
    async fn test_run_translates_tool_calls_and_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "claude-test",
                "thinking": {"type": "enabled", "budget_tokens": 4096}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "content": [
                        {"type": "thinking", "thinking": "hmm", "signature": "sig"},
                        {"type": "text", "text": "Listing."},
                        {"type": "tool_use", "id": "t1", "name": "publications-list_publications", "input": {}},
                        {"type": "tool_use", "id": "t2", "name": "", "input": {}}
                    ],
                    "usage": {"input_tokens": 100, "output_tokens": 20, "cache_read_input_tokens": 50}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let adapter = AnthropicAdapter::new(server.url(), "key".into(), settings(), true);
        let response = adapter
            .run(&[Message::user_text("hi")], "system", &[])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.message.tool_uses().count(), 1);
        assert_eq!(response.usage.input, 150);
        assert_eq!(response.usage.cached, 50);
        assert_eq!(response.usage.total, 170);
        assert_eq!(response.usage.thinking, 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(429)
            .create_async()
            .await;

        let adapter = AnthropicAdapter::new(server.url(), "key".into(), settings(), false);
        let err = adapter
            .run(&[Message::user_text("hi")], "system", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::RateLimit));
    }
}
