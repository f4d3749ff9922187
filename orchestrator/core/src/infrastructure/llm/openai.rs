// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// OpenAI LLM Provider Adapter
//
// Anti-Corruption Layer for the OpenAI Chat Completions API.
// Also works with OpenAI-compatible APIs (LM Studio, vLLM, etc.)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{status_error, ModelSettings};
use crate::domain::llm::{
    approximate_tokens, Content, LLMError, LLMProvider, Message, ModelResponse, Role, TokenUsage,
    ToolDefinition,
};

pub struct OpenAIAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    settings: ModelSettings,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAITool<'a>>,
}

#[derive(Serialize)]
struct OpenAITool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAIFunction<'a>,
}

#[derive(Serialize)]
struct OpenAIFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Serialize, Deserialize, Default)]
struct OpenAIMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: OpenAIFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    /// JSON-encoded arguments
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: OpenAIUsage,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[derive(Deserialize)]
struct CompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: u64,
}

impl OpenAIAdapter {
    pub fn new(endpoint: String, api_key: String, settings: ModelSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            settings,
        }
    }

    fn translate(system_prompt: &str, messages: &[Message]) -> Vec<OpenAIMessage> {
        let mut translated = vec![OpenAIMessage {
            role: "system".to_string(),
            content: Some(system_prompt.to_string()),
            ..Default::default()
        }];

        for message in messages {
            let text: Vec<&str> = message
                .content
                .iter()
                .filter_map(|c| match c {
                    Content::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect();
            let text = (!text.is_empty()).then(|| text.join("\n\n"));

            match message.role {
                Role::Assistant => {
                    let calls: Vec<OpenAIToolCall> = message
                        .tool_uses()
                        .map(|(id, name, input)| OpenAIToolCall {
                            id: id.to_string(),
                            kind: function_kind(),
                            function: OpenAIFunctionCall {
                                name: name.to_string(),
                                arguments: input.to_string(),
                            },
                        })
                        .collect();
                    translated.push(OpenAIMessage {
                        role: "assistant".to_string(),
                        content: text,
                        tool_calls: (!calls.is_empty()).then_some(calls),
                        tool_call_id: None,
                    });
                }
                Role::User => {
                    for c in &message.content {
                        if let Content::ToolResult {
                            tool_use_id, content, ..
                        } = c
                        {
                            translated.push(OpenAIMessage {
                                role: "tool".to_string(),
                                content: Some(content.clone()),
                                tool_calls: None,
                                tool_call_id: Some(tool_use_id.clone()),
                            });
                        }
                    }
                    if text.is_some() {
                        translated.push(OpenAIMessage {
                            role: "user".to_string(),
                            content: text,
                            ..Default::default()
                        });
                    }
                }
            }
        }
        translated
    }
}

#[async_trait]
impl LLMProvider for OpenAIAdapter {
    async fn run(
        &self,
        messages: &[Message],
        system_prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LLMError> {
        // Translate our domain types to OpenAI's types
        let request = OpenAIRequest {
            model: &self.settings.model,
            messages: Self::translate(system_prompt, messages),
            max_tokens: self.settings.max_output_tokens,
            tools: tools
                .iter()
                .map(|t| OpenAITool {
                    kind: "function",
                    function: OpenAIFunction {
                        name: &t.name,
                        description: &t.description,
                        parameters: &t.input_schema,
                    },
                })
                .collect(),
        };

        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(status_error(status, error_text, &self.settings.model));
        }

        let openai_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| LLMError::Provider(format!("Failed to parse response: {}", e)))?;

        // Translate OpenAI's response to our domain types
        let choice = openai_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::Provider("No response from model".into()))?;

        let mut content = Vec::new();
        if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
            content.push(Content::Text { text });
        }
        for call in choice.message.tool_calls.unwrap_or_default() {
            if call.function.name.is_empty() {
                warn!(model = %self.settings.model, "Dropping tool call without a name");
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(&call.function.arguments) {
                Ok(input) => content.push(Content::ToolUse {
                    id: call.id,
                    name: call.function.name,
                    input,
                }),
                Err(e) => warn!(
                    model = %self.settings.model,
                    tool = %call.function.name,
                    "Dropping tool call with undecodable arguments: {}",
                    e
                ),
            }
        }

        let usage = openai_response.usage;
        Ok(ModelResponse {
            message: Message {
                role: Role::Assistant,
                content,
            },
            usage: TokenUsage {
                total: usage.total_tokens,
                input: usage.prompt_tokens,
                output: usage.completion_tokens,
                cached: usage.prompt_tokens_details.map_or(0, |d| d.cached_tokens),
                thinking: usage.completion_tokens_details.map_or(0, |d| d.reasoning_tokens),
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
        // Simple check - try to list models endpoint
        let url = format!("{}/models", self.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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
