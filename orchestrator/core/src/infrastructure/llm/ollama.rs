// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Ollama LLM Provider Adapter
//
// Anti-Corruption Layer for Ollama local models over the /api/chat endpoint.
// Supports air-gapped deployments with local LLMs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::{status_error, ModelSettings};
use crate::domain::llm::{
    approximate_tokens, Content, LLMError, LLMProvider, Message, ModelResponse, Role, TokenUsage,
    ToolDefinition,
};

pub struct OllamaAdapter {
    client: reqwest::Client,
    endpoint: String,
    settings: ModelSettings,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: i64,
    num_ctx: u64,
}

#[derive(Serialize, Deserialize, Default)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct OllamaFunctionCall {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    eval_count: Option<u64>,
    prompt_eval_count: Option<u64>,
}

impl OllamaAdapter {
    pub fn new(endpoint: String, settings: ModelSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            settings,
        }
    }

    fn translate(system_prompt: &str, messages: &[Message]) -> Vec<OllamaMessage> {
        let mut translated = vec![OllamaMessage {
            role: "system".to_string(),
            content: system_prompt.to_string(),
            ..Default::default()
        }];

        for message in messages {
            let mut text = Vec::new();
            let mut tool_calls = Vec::new();
            for c in &message.content {
                match c {
                    Content::Text { text: t } => text.push(t.as_str()),
                    Content::ToolUse { name, input, .. } => tool_calls.push(OllamaToolCall {
                        function: OllamaFunctionCall {
                            name: name.clone(),
                            arguments: input.clone(),
                        },
                    }),
                    Content::ToolResult { content, .. } => translated.push(OllamaMessage {
                        role: "tool".to_string(),
                        content: content.clone(),
                        ..Default::default()
                    }),
                    Content::Thinking { .. } => {}
                }
            }
            if !text.is_empty() || !tool_calls.is_empty() {
                translated.push(OllamaMessage {
                    role: match message.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    }
                    .to_string(),
                    content: text.join("\n\n"),
                    tool_calls,
                });
            }
        }
        translated
    }
}

#[async_trait]
impl LLMProvider for OllamaAdapter {
    async fn run(
        &self,
        messages: &[Message],
        system_prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LLMError> {
        let request = OllamaRequest {
            model: &self.settings.model,
            messages: Self::translate(system_prompt, messages),
            stream: false,
            tools: tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect(),
            options: OllamaOptions {
                num_predict: self.settings.max_output_tokens as i64,
                num_ctx: self.settings.context_window,
            },
        };

        let url = format!("{}/api/chat", self.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, error_text, &self.settings.model));
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LLMError::Provider(format!("Failed to parse response: {}", e)))?;

        let mut content = Vec::new();
        if !ollama_response.message.content.is_empty() {
            content.push(Content::text(ollama_response.message.content));
        }
        for call in ollama_response.message.tool_calls {
            if call.function.name.is_empty() {
                warn!(model = %self.settings.model, "Dropping tool call without a name");
                continue;
            }
            // Ollama does not assign call ids
            content.push(Content::ToolUse {
                id: format!("call_{}", Uuid::new_v4().simple()),
                name: call.function.name,
                input: call.function.arguments,
            });
        }

        let input = ollama_response.prompt_eval_count.unwrap_or(0);
        let output = ollama_response.eval_count.unwrap_or(0);
        Ok(ModelResponse {
            message: Message {
                role: Role::Assistant,
                content,
            },
            usage: TokenUsage {
                total: input + output,
                input,
                output,
                cached: 0,
                thinking: 0,
            },
        })
    }

    async fn tokens(&self, messages: &[Message]) -> Result<u64, LLMError> {
        Ok(approximate_tokens(messages))
    }

    fn cost(&self, usages: &[TokenUsage]) -> f64 {
        self.settings.pricing.cost(usages)
    }

    fn max_context_tokens(&self) -> u64 {
        self.settings.context_window
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        // Check if Ollama server is running by listing models
        let url = format!("{}/api/tags", self.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(LLMError::Network(format!("HTTP {}", response.status())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::ModelPricing;

    #[tokio::test]
    async fn test_run_assigns_call_ids() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "message": {"role": "assistant", "content": "", "tool_calls": [
                        {"function": {"name": "goal_solution-report", "arguments": {"publication": "abc123"}}}
                    ]},
                    "prompt_eval_count": 12,
                    "eval_count": 3,
                    "done": true
                })
                .to_string(),
            )
            .create_async()
            .await;

        let adapter = OllamaAdapter::new(
            server.url(),
            ModelSettings {
                model: "llama3.2".into(),
                context_window: 8192,
                max_output_tokens: 1024,
                pricing: ModelPricing::default(),
            },
        );
        let response = adapter.run(&[Message::user_text("hi")], "sys", &[]).await.unwrap();

        let (id, name, input) = response.message.tool_uses().next().unwrap();
        assert!(id.starts_with("call_"));
        assert_eq!(name, "goal_solution-report");
        assert_eq!(input["publication"], "abc123");
        assert_eq!(response.usage.total, 15);
        assert_eq!(adapter.cost(&[response.usage]), 0.0);
    }
}
