// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::experiment::{AgentIndex, ExperimentId};
use crate::domain::publication::{
    Citation, ListOrder, Publication, PublicationId, PublicationStatus, Reference,
};
use crate::domain::repository::{PublicationRepository, RepositoryError};

const COLUMNS: &str =
    "p.id, p.experiment_id, p.author, p.title, p.reference, p.status, p.cited_references, p.created_at, p.updated_at";

pub struct PostgresPublicationRepository {
    pool: PgPool,
}

impl PostgresPublicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<Publication, RepositoryError> {
        let reference: String = row.get("reference");
        let status: String = row.get("status");
        let cited: Vec<String> = row.get("cited_references");
        let author: i32 = row.get("author");
        Ok(Publication {
            id: PublicationId(row.get("id")),
            experiment_id: ExperimentId(row.get("experiment_id")),
            author: AgentIndex(author as u32),
            title: row.get("title"),
            reference: Reference::parse(&reference).map_err(RepositoryError::Serialization)?,
            status: status.parse().map_err(RepositoryError::Serialization)?,
            cited_references: cited
                .iter()
                .map(|r| Reference::parse(r))
                .collect::<Result<_, _>>()
                .map_err(RepositoryError::Serialization)?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl PublicationRepository for PostgresPublicationRepository {
    async fn insert(&self, publication: &Publication) -> Result<(), RepositoryError> {
        let cited: Vec<String> = publication
            .cited_references
            .iter()
            .map(|r| r.as_str().to_string())
            .collect();

        sqlx::query(
            r#"
            INSERT INTO publications (id, experiment_id, author, title, reference, status, cited_references, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(publication.id.0)
        .bind(publication.experiment_id.0)
        .bind(publication.author.0 as i32)
        .bind(&publication.title)
        .bind(publication.reference.as_str())
        .bind(publication.status.as_str())
        .bind(&cited)
        .bind(publication.created_at)
        .bind(publication.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: PublicationId) -> Result<Option<Publication>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM publications p WHERE p.id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn find_by_reference(
        &self,
        experiment: ExperimentId,
        reference: &Reference,
    ) -> Result<Option<Publication>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM publications p WHERE p.experiment_id = $1 AND p.reference = $2"
        ))
        .bind(experiment.0)
        .bind(reference.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn find_by_references(
        &self,
        experiment: ExperimentId,
        references: &[Reference],
    ) -> Result<Vec<Publication>, RepositoryError> {
        let tokens: Vec<String> = references.iter().map(|r| r.as_str().to_string()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM publications p WHERE p.experiment_id = $1 AND p.reference = ANY($2)"
        ))
        .bind(experiment.0)
        .bind(&tokens)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn find_by_ids(&self, ids: &[PublicationId]) -> Result<Vec<Publication>, RepositoryError> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM publications p WHERE p.id = ANY($1)"))
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn list_by_status(
        &self,
        experiment: ExperimentId,
        status: PublicationStatus,
        order: ListOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Publication>, RepositoryError> {
        let query = match order {
            ListOrder::Latest => format!(
                r#"
                SELECT {COLUMNS}
                FROM publications p
                WHERE p.experiment_id = $1 AND p.status = $2
                ORDER BY p.created_at DESC
                LIMIT $3 OFFSET $4
                "#
            ),
            ListOrder::Citations => format!(
                r#"
                SELECT {COLUMNS}
                FROM publications p
                LEFT JOIN citations c ON c.to_publication = p.id
                WHERE p.experiment_id = $1 AND p.status = $2
                GROUP BY p.id
                ORDER BY COUNT(c.from_publication) DESC, p.created_at DESC
                LIMIT $3 OFFSET $4
                "#
            ),
        };

        let rows = sqlx::query(&query)
            .bind(experiment.0)
            .bind(status.as_str())
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn list_by_author(
        &self,
        experiment: ExperimentId,
        author: AgentIndex,
    ) -> Result<Vec<Publication>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM publications p WHERE p.experiment_id = $1 AND p.author = $2 ORDER BY p.created_at DESC"
        ))
        .bind(experiment.0)
        .bind(author.0 as i32)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn finalize(
        &self,
        id: PublicationId,
        status: PublicationStatus,
        citations: &[Citation],
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE publications
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'SUBMITTED'
            "#,
        )
        .bind(id.0)
        .bind(status.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for citation in citations {
            sqlx::query(
                r#"
                INSERT INTO citations (experiment_id, from_publication, to_publication)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(citation.experiment_id.0)
            .bind(citation.from.0)
            .bind(citation.to.0)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn citation_count(&self, id: PublicationId) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM citations WHERE to_publication = $1")
            .bind(id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn citations_from(&self, id: PublicationId) -> Result<Vec<Citation>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT experiment_id, from_publication, to_publication
            FROM citations
            WHERE from_publication = $1
            "#,
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Citation {
                experiment_id: ExperimentId(row.get("experiment_id")),
                from: PublicationId(row.get("from_publication")),
                to: PublicationId(row.get("to_publication")),
            })
            .collect())
    }

    async fn delete(&self, id: PublicationId) -> Result<(), RepositoryError> {
        // Reviews and citations cascade
        sqlx::query("DELETE FROM publications WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_by_experiment(&self, experiment: ExperimentId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM citations WHERE experiment_id = $1")
            .bind(experiment.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM publications WHERE experiment_id = $1")
            .bind(experiment.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
