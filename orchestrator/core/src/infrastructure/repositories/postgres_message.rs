// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::conversation::AgentMessage;
use crate::domain::experiment::{AgentIndex, ExperimentId};
use crate::domain::llm::{Content, Message, Role, TokenUsage};
use crate::domain::repository::{MessageRepository, RepositoryError};

pub struct PostgresMessageRepository {
    pool: PgPool,
}

impl PostgresMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<AgentMessage, RepositoryError> {
        let role: String = row.get("role");
        let role = match role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            other => return Err(RepositoryError::Serialization(format!("Unknown role '{}'", other))),
        };
        let content: Vec<Content> = serde_json::from_value(row.get("content"))?;
        let agent: i32 = row.get("agent");
        let position: i64 = row.get("position");
        let total: Option<i64> = row.get("usage_total");
        let usage = total.map(|total| TokenUsage {
            total: total as u64,
            input: row.get::<Option<i64>, _>("usage_input").unwrap_or_default() as u64,
            output: row.get::<Option<i64>, _>("usage_output").unwrap_or_default() as u64,
            cached: row.get::<Option<i64>, _>("usage_cached").unwrap_or_default() as u64,
            thinking: row.get::<Option<i64>, _>("usage_thinking").unwrap_or_default() as u64,
        });

        Ok(AgentMessage {
            id: row.get("id"),
            experiment_id: ExperimentId(row.get("experiment_id")),
            agent: AgentIndex(agent as u32),
            position: position as u64,
            message: Message { role, content },
            usage,
            cost: row.get("cost"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn append(&self, message: &AgentMessage) -> Result<(), RepositoryError> {
        let role = match message.message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        let content = serde_json::to_value(&message.message.content)?;
        let usage = message.usage;

        sqlx::query(
            r#"
            INSERT INTO messages (
                id, experiment_id, agent, position, role, content,
                usage_total, usage_input, usage_output, usage_cached, usage_thinking,
                cost, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(message.id)
        .bind(message.experiment_id.0)
        .bind(message.agent.0 as i32)
        .bind(message.position as i64)
        .bind(role)
        .bind(&content)
        .bind(usage.map(|u| u.total as i64))
        .bind(usage.map(|u| u.input as i64))
        .bind(usage.map(|u| u.output as i64))
        .bind(usage.map(|u| u.cached as i64))
        .bind(usage.map(|u| u.thinking as i64))
        .bind(message.cost)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_agent(
        &self,
        experiment: ExperimentId,
        agent: AgentIndex,
    ) -> Result<Vec<AgentMessage>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, experiment_id, agent, position, role, content,
                   usage_total, usage_input, usage_output, usage_cached, usage_thinking,
                   cost, created_at
            FROM messages
            WHERE experiment_id = $1 AND agent = $2
            ORDER BY position ASC
            "#,
        )
        .bind(experiment.0)
        .bind(agent.0 as i32)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn total_cost(&self, experiment: ExperimentId) -> Result<f64, RepositoryError> {
        let cost: f64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(cost), 0)::DOUBLE PRECISION FROM messages WHERE experiment_id = $1")
                .bind(experiment.0)
                .fetch_one(&self.pool)
                .await?;
        Ok(cost)
    }

    async fn token_usage(
        &self,
        experiment: ExperimentId,
        agent: Option<AgentIndex>,
    ) -> Result<TokenUsage, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(usage_total), 0)::BIGINT AS total,
                   COALESCE(SUM(usage_input), 0)::BIGINT AS input,
                   COALESCE(SUM(usage_output), 0)::BIGINT AS output,
                   COALESCE(SUM(usage_cached), 0)::BIGINT AS cached,
                   COALESCE(SUM(usage_thinking), 0)::BIGINT AS thinking
            FROM messages
            WHERE experiment_id = $1 AND ($2::INTEGER IS NULL OR agent = $2)
            "#,
        )
        .bind(experiment.0)
        .bind(agent.map(|a| a.0 as i32))
        .fetch_one(&self.pool)
        .await?;

        Ok(TokenUsage {
            total: row.get::<i64, _>("total") as u64,
            input: row.get::<i64, _>("input") as u64,
            output: row.get::<i64, _>("output") as u64,
            cached: row.get::<i64, _>("cached") as u64,
            thinking: row.get::<i64, _>("thinking") as u64,
        })
    }

    async fn delete_by_experiment(&self, experiment: ExperimentId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM messages WHERE experiment_id = $1")
            .bind(experiment.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
