// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::experiment::{AgentIndex, ExperimentId};
use crate::domain::publication::{Grade, PublicationId, Review, ReviewId};
use crate::domain::repository::{RepositoryError, ReviewRepository};

pub struct PostgresReviewRepository {
    pool: PgPool,
}

impl PostgresReviewRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<Review, RepositoryError> {
        let grade: Option<String> = row.get("grade");
        let reviewer: i32 = row.get("reviewer");
        Ok(Review {
            id: ReviewId(row.get("id")),
            experiment_id: ExperimentId(row.get("experiment_id")),
            publication_id: PublicationId(row.get("publication_id")),
            reviewer: AgentIndex(reviewer as u32),
            grade: grade
                .map(|g| g.parse::<Grade>())
                .transpose()
                .map_err(RepositoryError::Serialization)?,
            content: row.get("content"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl ReviewRepository for PostgresReviewRepository {
    async fn create_requests(&self, publication: PublicationId, reviews: &[Review]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE publication_id = $1")
            .bind(publication.0)
            .fetch_one(&mut *tx)
            .await?;
        if existing > 0 {
            return Err(RepositoryError::Conflict(format!(
                "Reviews already requested for publication {}",
                publication
            )));
        }

        for review in reviews {
            sqlx::query(
                r#"
                INSERT INTO reviews (id, experiment_id, publication_id, reviewer, grade, content, created_at, updated_at)
                VALUES ($1, $2, $3, $4, NULL, NULL, $5, $6)
                "#,
            )
            .bind(review.id.0)
            .bind(review.experiment_id.0)
            .bind(publication.0)
            .bind(review.reviewer.0 as i32)
            .bind(review.created_at)
            .bind(review.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_publication(&self, publication: PublicationId) -> Result<Vec<Review>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, experiment_id, publication_id, reviewer, grade, content, created_at, updated_at
            FROM reviews
            WHERE publication_id = $1
            ORDER BY reviewer
            "#,
        )
        .bind(publication.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn submit(
        &self,
        publication: PublicationId,
        reviewer: AgentIndex,
        grade: Grade,
        content: &str,
    ) -> Result<Option<Review>, RepositoryError> {
        let row = sqlx::query(
            r#"
            UPDATE reviews
            SET grade = $3, content = $4, updated_at = NOW()
            WHERE publication_id = $1 AND reviewer = $2 AND grade IS NULL
            RETURNING id, experiment_id, publication_id, reviewer, grade, content, created_at, updated_at
            "#,
        )
        .bind(publication.0)
        .bind(reviewer.0 as i32)
        .bind(grade.as_str())
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn find_pending_by_reviewer(
        &self,
        experiment: ExperimentId,
        reviewer: AgentIndex,
    ) -> Result<Vec<Review>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, experiment_id, publication_id, reviewer, grade, content, created_at, updated_at
            FROM reviews
            WHERE experiment_id = $1 AND reviewer = $2 AND grade IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .bind(experiment.0)
        .bind(reviewer.0 as i32)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn delete_by_experiment(&self, experiment: ExperimentId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM reviews WHERE experiment_id = $1")
            .bind(experiment.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
