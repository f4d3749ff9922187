// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::experiment::{Experiment, ExperimentId, Profile};
use crate::domain::repository::{ExperimentRepository, RepositoryError};

pub struct PostgresExperimentRepository {
    pool: PgPool,
}

impl PostgresExperimentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<Experiment, RepositoryError> {
        let profile: String = row.get("profile");
        let agent_count: i32 = row.get("agent_count");
        Ok(Experiment {
            id: ExperimentId(row.get("id")),
            name: row.get("name"),
            problem: row.get("problem"),
            model: row.get("model"),
            agent_count: agent_count as u32,
            profile: profile.parse::<Profile>().map_err(RepositoryError::Serialization)?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl ExperimentRepository for PostgresExperimentRepository {
    async fn create(&self, experiment: &Experiment) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO experiments (id, name, problem, model, agent_count, profile, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(experiment.id.0)
        .bind(&experiment.name)
        .bind(&experiment.problem)
        .bind(&experiment.model)
        .bind(experiment.agent_count as i32)
        .bind(experiment.profile.as_str())
        .bind(experiment.created_at)
        .bind(experiment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: ExperimentId) -> Result<Option<Experiment>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, problem, model, agent_count, profile, created_at, updated_at
            FROM experiments
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Experiment>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, problem, model, agent_count, profile, created_at, updated_at
            FROM experiments
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Experiment>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, problem, model, agent_count, profile, created_at, updated_at
            FROM experiments
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn delete(&self, id: ExperimentId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM experiments WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
