// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::experiment::{AgentIndex, ExperimentId};
use crate::domain::publication::PublicationId;
use crate::domain::repository::{RepositoryError, SolutionRepository};
use crate::domain::solution::Solution;

pub struct PostgresSolutionRepository {
    pool: PgPool,
}

impl PostgresSolutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Solution {
        let agent: i32 = row.get("agent");
        Solution {
            experiment_id: ExperimentId(row.get("experiment_id")),
            agent: AgentIndex(agent as u32),
            publication_id: PublicationId(row.get("publication_id")),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl SolutionRepository for PostgresSolutionRepository {
    async fn upsert(&self, solution: &Solution) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO solutions (experiment_id, agent, publication_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (experiment_id, agent) DO UPDATE SET
                publication_id = EXCLUDED.publication_id,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(solution.experiment_id.0)
        .bind(solution.agent.0 as i32)
        .bind(solution.publication_id.0)
        .bind(solution.created_at)
        .bind(solution.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_agent(
        &self,
        experiment: ExperimentId,
        agent: AgentIndex,
    ) -> Result<Option<Solution>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT experiment_id, agent, publication_id, created_at, updated_at
            FROM solutions
            WHERE experiment_id = $1 AND agent = $2
            "#,
        )
        .bind(experiment.0)
        .bind(agent.0 as i32)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::from_row))
    }

    async fn list_by_experiment(&self, experiment: ExperimentId) -> Result<Vec<Solution>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT experiment_id, agent, publication_id, created_at, updated_at
            FROM solutions
            WHERE experiment_id = $1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(experiment.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::from_row).collect())
    }

    async fn delete_by_experiment(&self, experiment: ExperimentId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM solutions WHERE experiment_id = $1")
            .bind(experiment.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
