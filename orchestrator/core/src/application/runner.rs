// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tick Scheduler
//!
//! Drives one agent. Each [`Runner::tick`] performs exactly one cycle:
//!
//! 1. Drain the agent's advisories. They are appended to the next user turn
//!    (opening prompt, continuation prompt or tool results) and kept on the
//!    runner until that turn is built, so a failed tick does not lose them.
//! 2. Call the model with the pruned history, the system prompt and the tool
//!    set. Provider errors end the tick.
//! 3. Dispatch every tool call through the agent's [`ToolRouter`]. Tool
//!    failures become error tool results and never end the tick.
//! 4. Persist the model turn with its usage and cost, then the tool results.
//!
//! ## State machine
//!
//! ```text
//! Idle → AwaitingModelResponse → DispatchingTools → Persisting → Idle
//!                    (any error) → Stopped
//! ```
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Per-agent action loop step

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::advisory::AdvisoryMailbox;
use crate::application::computer::AgentComputer;
use crate::application::prompt::{opening_prompt, system_prompt, CONTINUE_PROMPT};
use crate::application::tools::ToolRouter;
use crate::domain::advisory::AdvisoryMessage;
use crate::domain::conversation::AgentMessage;
use crate::domain::error::ErrorKind;
use crate::domain::experiment::{AgentIndex, Experiment};
use crate::domain::llm::{Content, LLMError, LLMProvider, Message, Role, ToolDefinition, TokenUsage};
use crate::domain::repository::{MessageRepository, RepositoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickState {
    Idle,
    AwaitingModelResponse,
    DispatchingTools,
    Persisting,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error("Model error: {0}")]
    Model(#[from] LLMError),

    #[error("Failed to persist conversation: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("Agent {0} is stopped")]
    Stopped(AgentIndex),
}

impl TickError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TickError::Model(_) => ErrorKind::ModelError,
            TickError::Persistence(_) | TickError::Stopped(_) => ErrorKind::FatalSchedulerError,
        }
    }
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickSummary {
    pub tool_calls: usize,
    pub usage: TokenUsage,
    pub cost: f64,
}

pub struct Runner {
    experiment: Experiment,
    agent: AgentIndex,
    provider: Arc<dyn LLMProvider>,
    tools: ToolRouter,
    tool_definitions: Vec<ToolDefinition>,
    messages: Arc<dyn MessageRepository>,
    mailbox: Arc<AdvisoryMailbox>,
    computer: Option<Arc<AgentComputer>>,
    system_prompt: String,
    history: Vec<AgentMessage>,
    advisories: Vec<AdvisoryMessage>,
    state: TickState,
}

impl Runner {
    /// Build a runner and reload the agent's persisted history
    pub async fn load(
        experiment: Experiment,
        agent: AgentIndex,
        provider: Arc<dyn LLMProvider>,
        tools: ToolRouter,
        messages: Arc<dyn MessageRepository>,
        mailbox: Arc<AdvisoryMailbox>,
        computer: Option<Arc<AgentComputer>>,
    ) -> Result<Self, TickError> {
        let history = messages.list_for_agent(experiment.id, agent).await?;
        let tool_definitions = tools.definitions();
        let mut runner = Self {
            system_prompt: system_prompt(&experiment, agent, computer.is_some()),
            experiment,
            agent,
            provider,
            tools,
            tool_definitions,
            messages,
            mailbox,
            computer,
            history,
            advisories: Vec::new(),
            state: TickState::Idle,
        };
        runner.close_interrupted_tool_calls().await?;
        debug!(agent = agent.0, messages = runner.history.len(), "Runner loaded");
        Ok(runner)
    }

    pub fn agent(&self) -> AgentIndex {
        self.agent
    }

    pub fn state(&self) -> TickState {
        self.state
    }

    pub fn computer(&self) -> Option<&Arc<AgentComputer>> {
        self.computer.as_ref()
    }

    pub fn history(&self) -> &[AgentMessage] {
        &self.history
    }

    pub fn stop(&mut self) {
        self.transition(TickState::Stopped);
    }

    pub async fn tick(&mut self) -> Result<TickSummary, TickError> {
        if self.state == TickState::Stopped {
            return Err(TickError::Stopped(self.agent));
        }
        match self.run_tick().await {
            Ok(summary) => {
                self.transition(TickState::Idle);
                metrics::counter!("agora_ticks_total").increment(1);
                info!(
                    experiment = %self.experiment.name,
                    agent = self.agent.0,
                    tool_calls = summary.tool_calls,
                    tokens = summary.usage.total,
                    cost = summary.cost,
                    "Tick completed"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(agent = self.agent.0, error = %e, "Tick failed");
                self.transition(TickState::Stopped);
                Err(e)
            }
        }
    }

    async fn run_tick(&mut self) -> Result<TickSummary, TickError> {
        self.advisories.extend(self.mailbox.drain(self.agent));

        let prompt = match self.history.last() {
            None => Some(opening_prompt(&self.experiment)),
            Some(last) if last.message.role == Role::Assistant => Some(CONTINUE_PROMPT.to_string()),
            Some(_) => None,
        };
        if let Some(prompt) = prompt {
            let turn = self.user_turn(vec![Content::text(prompt)]);
            self.append(turn).await?;
        }

        self.transition(TickState::AwaitingModelResponse);
        let context = self.context().await?;
        let response = self
            .provider
            .run(&context, &self.system_prompt, &self.tool_definitions)
            .await?;

        self.transition(TickState::DispatchingTools);
        let mut results = Vec::new();
        for (id, name, input) in response.message.tool_uses() {
            debug!(agent = self.agent.0, tool = %name, "Dispatching tool call");
            results.push(self.tools.dispatch(id, name, input).await);
        }
        let tool_calls = results.len();

        self.transition(TickState::Persisting);
        let cost = self.provider.cost(&[response.usage]);
        let position = self.next_position();
        let model_turn = AgentMessage::new(self.experiment.id, self.agent, position, response.message)
            .with_usage(response.usage, cost);
        self.messages.append(&model_turn).await?;
        self.history.push(model_turn);

        if !results.is_empty() {
            let turn = self.user_turn(results);
            self.append(turn).await?;
        }

        Ok(TickSummary {
            tool_calls,
            usage: response.usage,
            cost,
        })
    }

    /// User turn with any held advisories appended as text
    fn user_turn(&mut self, mut content: Vec<Content>) -> Message {
        content.extend(
            self.advisories
                .drain(..)
                .map(|advisory| Content::text(advisory.render())),
        );
        Message {
            role: Role::User,
            content,
        }
    }

    async fn append(&mut self, message: Message) -> Result<(), TickError> {
        let record = AgentMessage::new(self.experiment.id, self.agent, self.next_position(), message);
        self.messages.append(&record).await?;
        self.history.push(record);
        Ok(())
    }

    fn next_position(&self) -> u64 {
        self.history.len() as u64
    }

    /// History to send to the model, pruned to the provider's context window.
    /// The opening prompt is always kept; the oldest assistant/user pairs after
    /// it are dropped first.
    async fn context(&self) -> Result<Vec<Message>, TickError> {
        let mut context: Vec<Message> = self.history.iter().map(|m| m.message.clone()).collect();
        let budget = self.provider.max_context_tokens();
        let mut dropped = 0;
        while context.len() >= 5 && self.provider.tokens(&context).await? > budget {
            context.remove(1);
            context.remove(1);
            dropped += 2;
        }
        if dropped > 0 {
            debug!(agent = self.agent.0, dropped, "Pruned conversation to fit context window");
        }
        Ok(context)
    }

    /// A model turn whose tool calls never got results (the process stopped
    /// mid-tick) is answered with error results so the history stays valid.
    async fn close_interrupted_tool_calls(&mut self) -> Result<(), TickError> {
        let interrupted: Vec<Content> = match self.history.last() {
            Some(last) if last.message.role == Role::Assistant && last.message.has_tool_uses() => last
                .message
                .tool_uses()
                .map(|(id, name, _)| Content::ToolResult {
                    tool_use_id: id.to_string(),
                    name: name.to_string(),
                    content: format!("Error [{}]: Tool call interrupted", ErrorKind::FatalSchedulerError),
                    is_error: true,
                })
                .collect(),
            _ => return Ok(()),
        };
        warn!(agent = self.agent.0, calls = interrupted.len(), "Closing interrupted tool calls");
        self.append(Message {
            role: Role::User,
            content: interrupted,
        })
        .await
    }

    fn transition(&mut self, next: TickState) {
        if self.state != next {
            debug!(agent = self.agent.0, from = ?self.state, to = ?next, "Runner state transition");
            self.state = next;
        }
    }
}
