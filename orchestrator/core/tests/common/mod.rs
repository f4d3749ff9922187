// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fakes for the integration tests: a scripted language model, a
//! factory handing out queued providers and a sandbox that records calls.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agora_orchestrator_core::application::{ExperimentService, Repositories, RunOptions};
use agora_orchestrator_core::domain::experiment::Profile;
use agora_orchestrator_core::domain::llm::{
    approximate_tokens, Content, LLMError, LLMProvider, LLMProviderFactory, Message, ModelPricing,
    ModelResponse, Role, TokenUsage, ToolDefinition,
};
use agora_orchestrator_core::domain::repository::MessageRepository;
use agora_orchestrator_core::domain::sandbox::{
    ExecOutput, ExecRequest, Sandbox, SandboxError, SandboxId,
};
use agora_orchestrator_core::infrastructure::content_store::FsContentStore;

pub const USAGE: TokenUsage = TokenUsage {
    total: 1_500,
    input: 1_000,
    output: 500,
    cached: 0,
    thinking: 0,
};

type Responder = Box<dyn Fn(&[Message]) -> Result<Message, LLMError> + Send + Sync>;

/// Language model answering each call through a closure over the context
pub struct ScriptedProvider {
    responder: Responder,
    pricing: ModelPricing,
    max_context: u64,
    delay: Option<Duration>,
    pub contexts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(responder: impl Fn(&[Message]) -> Result<Message, LLMError> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            // USAGE costs one dollar per call
            pricing: ModelPricing {
                input_per_million: 500.0,
                output_per_million: 1_000.0,
            },
            max_context: 1_000_000,
            delay: None,
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Plays `responses` in order, then answers with plain text
    pub fn sequence(responses: Vec<Message>) -> Self {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::new(move |_| {
            Ok(queue
                .lock()
                .pop_front()
                .unwrap_or_else(|| Message::assistant_text("Thinking about the problem.")))
        })
    }

    pub fn with_max_context(mut self, tokens: u64) -> Self {
        self.max_context = tokens;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn last_context(&self) -> Vec<Message> {
        self.contexts.lock().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn run(
        &self,
        messages: &[Message],
        _system_prompt: &str,
        _tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LLMError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.contexts.lock().push(messages.to_vec());
        let message = (self.responder)(messages)?;
        Ok(ModelResponse {
            message,
            usage: USAGE,
        })
    }

    async fn tokens(&self, messages: &[Message]) -> Result<u64, LLMError> {
        Ok(approximate_tokens(messages))
    }

    fn cost(&self, usages: &[TokenUsage]) -> f64 {
        self.pricing.cost(usages)
    }

    fn max_context_tokens(&self) -> u64 {
        self.max_context
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        Ok(())
    }
}

/// Hands out queued providers in the order runners are built (agent order)
#[derive(Default)]
pub struct QueuedFactory {
    providers: Mutex<VecDeque<Arc<dyn LLMProvider>>>,
}

impl QueuedFactory {
    pub fn push(&self, provider: Arc<ScriptedProvider>) {
        self.providers.lock().push_back(provider);
    }
}

impl LLMProviderFactory for QueuedFactory {
    fn has_model(&self, alias: &str) -> bool {
        alias == "default"
    }

    fn create(&self, alias: &str, _thinking: bool) -> Result<Arc<dyn LLMProvider>, LLMError> {
        self.providers
            .lock()
            .pop_front()
            .ok_or_else(|| LLMError::ModelNotFound(format!("No scripted provider left for {}", alias)))
    }
}

/// Sandbox that records every call and answers commands with `ok`
#[derive(Default)]
pub struct RecordingSandbox {
    pub created: Mutex<Vec<String>>,
    pub commands: Mutex<Vec<(String, String)>>,
    pub stopped: Mutex<Vec<String>>,
    pub terminated: Mutex<Vec<String>>,
}

#[async_trait]
impl Sandbox for RecordingSandbox {
    async fn build_image(&self, profile: Profile) -> Result<String, SandboxError> {
        Ok(profile.image_name())
    }

    async fn create(&self, id: &str, _image: &str) -> Result<SandboxId, SandboxError> {
        self.created.lock().push(id.to_string());
        Ok(SandboxId::new(id))
    }

    async fn execute(&self, handle: &SandboxId, request: ExecRequest) -> Result<ExecOutput, SandboxError> {
        self.commands
            .lock()
            .push((handle.as_str().to_string(), request.command));
        Ok(ExecOutput {
            stdout: "ok".to_string(),
            stderr: String::new(),
            exit_code: 0,
        })
    }

    async fn copy_in(&self, _: &SandboxId, _: &Path, _: &str) -> Result<(), SandboxError> {
        Ok(())
    }

    async fn copy_out(&self, _: &SandboxId, _: &str, _: &Path) -> Result<(), SandboxError> {
        Ok(())
    }

    async fn stop(&self, handle: &SandboxId) -> Result<(), SandboxError> {
        self.stopped.lock().push(handle.as_str().to_string());
        Ok(())
    }

    async fn terminate(&self, handle: &SandboxId) -> Result<(), SandboxError> {
        self.terminated.lock().push(handle.as_str().to_string());
        Ok(())
    }
}

pub struct Harness {
    pub service: ExperimentService,
    pub repos: Repositories,
    pub factory: Arc<QueuedFactory>,
    pub sandbox: Arc<RecordingSandbox>,
    _dir: tempfile::TempDir,
}

pub fn harness() -> Harness {
    harness_with_messages(|messages| messages)
}

/// Harness whose message store is wrapped by `wrap`
pub fn harness_with_messages(
    wrap: impl FnOnce(Arc<dyn MessageRepository>) -> Arc<dyn MessageRepository>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut repos = Repositories::in_memory(Arc::new(FsContentStore::new(dir.path())));
    repos.messages = wrap(repos.messages.clone());
    let factory = Arc::new(QueuedFactory::default());
    let sandbox = Arc::new(RecordingSandbox::default());
    let service = ExperimentService::new(repos.clone(), factory.clone(), Some(sandbox.clone()));
    Harness {
        service,
        repos,
        factory,
        sandbox,
        _dir: dir,
    }
}

pub fn options(computer: bool) -> RunOptions {
    RunOptions {
        computer,
        seed: Some(7),
        ..RunOptions::default()
    }
}

pub fn tool_call(id: &str, name: &str, input: serde_json::Value) -> Message {
    Message {
        role: Role::Assistant,
        content: vec![Content::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }],
    }
}

/// Text of every tool result in `message`
pub fn tool_results(message: &Message) -> Vec<(String, bool)> {
    message
        .content
        .iter()
        .filter_map(|c| match c {
            Content::ToolResult { content, is_error, .. } => Some((content.clone(), *is_error)),
            _ => None,
        })
        .collect()
}

/// First `reference=[xxxxxx]` token found in the context
pub fn find_reference(messages: &[Message]) -> Option<String> {
    messages.iter().rev().find_map(|m| {
        m.content.iter().find_map(|c| {
            let text = match c {
                Content::ToolResult { content, .. } => content,
                Content::Text { text } => text,
                _ => return None,
            };
            let start = text.find("reference=[")? + "reference=[".len();
            text.get(start..start + 6).map(str::to_string)
        })
    })
}
