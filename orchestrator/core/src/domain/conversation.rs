// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Persisted agent conversation turns with their token usage and cost.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Conversation record used for history reload and cost accounting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::experiment::{AgentIndex, ExperimentId};
use crate::domain::llm::{Message, TokenUsage};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentMessage {
    pub id: Uuid,
    pub experiment_id: ExperimentId,
    pub agent: AgentIndex,
    /// Dense position in the agent's history, starting at 0
    pub position: u64,
    pub message: Message,
    /// Set on model turns only
    pub usage: Option<TokenUsage>,
    /// Dollar cost of `usage`
    pub cost: f64,
    pub created_at: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(experiment_id: ExperimentId, agent: AgentIndex, position: u64, message: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            experiment_id,
            agent,
            position,
            message,
            usage: None,
            cost: 0.0,
            created_at: Utc::now(),
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage, cost: f64) -> Self {
        self.usage = Some(usage);
        self.cost = cost;
        self
    }
}
