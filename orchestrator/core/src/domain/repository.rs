// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate, following the DDD Repository
//! pattern: interface defined in the domain layer, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `ExperimentRepository` | `Experiment` | `InMemoryExperimentRepository`, `PostgresExperimentRepository` |
//! | `PublicationRepository` | `Publication` + outbound `Citation`s | `InMemoryPublicationRepository`, `PostgresPublicationRepository` |
//! | `ReviewRepository` | `Review` | `InMemoryReviewRepository`, `PostgresReviewRepository` |
//! | `SolutionRepository` | `Solution` | `InMemorySolutionRepository`, `PostgresSolutionRepository` |
//! | `MessageRepository` | `AgentMessage` | `InMemoryMessageRepository`, `PostgresMessageRepository` |
//!
//! ## Atomicity requirements
//!
//! - `PublicationRepository::finalize` performs the `SUBMITTED -> terminal`
//!   transition and the citation insert as one unit, and only if the row is
//!   still `SUBMITTED`. Exactly one concurrent caller observes `true`.
//! - `ReviewRepository::submit` only updates a review that is still pending.
//! - `SolutionRepository::upsert` replaces the vote keyed by (experiment, agent).
//!
//! ## Storage Backend Abstraction
//!
//! Concrete implementations are selected at startup based on configuration
//! (`agora-config.yaml`). In-memory implementations are used for development
//! and testing; PostgreSQL implementations for persistent runs.

use async_trait::async_trait;

use crate::domain::conversation::AgentMessage;
use crate::domain::experiment::{AgentIndex, Experiment, ExperimentId};
use crate::domain::llm::TokenUsage;
use crate::domain::publication::{
    Citation, Grade, ListOrder, Publication, PublicationId, PublicationStatus, Reference, Review,
};
use crate::domain::solution::Solution;

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

#[async_trait]
pub trait ExperimentRepository: Send + Sync {
    /// Insert a new experiment; fails with `Conflict` if the name is taken
    async fn create(&self, experiment: &Experiment) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: ExperimentId) -> Result<Option<Experiment>, RepositoryError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Experiment>, RepositoryError>;

    /// List all experiments, most recent first
    async fn list_all(&self) -> Result<Vec<Experiment>, RepositoryError>;

    async fn delete(&self, id: ExperimentId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PublicationRepository: Send + Sync {
    /// Insert a new publication; fails with `Conflict` if its reference is
    /// already used in the experiment
    async fn insert(&self, publication: &Publication) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: PublicationId) -> Result<Option<Publication>, RepositoryError>;

    async fn find_by_reference(
        &self,
        experiment: ExperimentId,
        reference: &Reference,
    ) -> Result<Option<Publication>, RepositoryError>;

    /// Publications of `experiment` whose reference is in `references`
    async fn find_by_references(
        &self,
        experiment: ExperimentId,
        references: &[Reference],
    ) -> Result<Vec<Publication>, RepositoryError>;

    async fn find_by_ids(&self, ids: &[PublicationId]) -> Result<Vec<Publication>, RepositoryError>;

    /// Page through publications with `status`, ordered by recency or by
    /// inbound citation count (ties broken by recency)
    async fn list_by_status(
        &self,
        experiment: ExperimentId,
        status: PublicationStatus,
        order: ListOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Publication>, RepositoryError>;

    /// Publications authored by `author`, most recent first
    async fn list_by_author(
        &self,
        experiment: ExperimentId,
        author: AgentIndex,
    ) -> Result<Vec<Publication>, RepositoryError>;

    /// Transition a `SUBMITTED` publication to `status` and insert its
    /// citations atomically. Returns `false` without writing anything if the
    /// publication already left `SUBMITTED`.
    async fn finalize(
        &self,
        id: PublicationId,
        status: PublicationStatus,
        citations: &[Citation],
    ) -> Result<bool, RepositoryError>;

    /// Number of citations pointing at `id`
    async fn citation_count(&self, id: PublicationId) -> Result<u64, RepositoryError>;

    /// Citations made by `id`
    async fn citations_from(&self, id: PublicationId) -> Result<Vec<Citation>, RepositoryError>;

    /// Remove a publication that never received its review set
    async fn delete(&self, id: PublicationId) -> Result<(), RepositoryError>;

    async fn delete_by_experiment(&self, experiment: ExperimentId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Create the review set of `publication`; fails with `Conflict` if one
    /// already exists
    async fn create_requests(&self, publication: PublicationId, reviews: &[Review]) -> Result<(), RepositoryError>;

    async fn find_by_publication(&self, publication: PublicationId) -> Result<Vec<Review>, RepositoryError>;

    /// Grade the pending review of `reviewer` on `publication`. Returns `None`
    /// if no pending review matches.
    async fn submit(
        &self,
        publication: PublicationId,
        reviewer: AgentIndex,
        grade: Grade,
        content: &str,
    ) -> Result<Option<Review>, RepositoryError>;

    /// Ungraded reviews assigned to `reviewer`
    async fn find_pending_by_reviewer(
        &self,
        experiment: ExperimentId,
        reviewer: AgentIndex,
    ) -> Result<Vec<Review>, RepositoryError>;

    async fn delete_by_experiment(&self, experiment: ExperimentId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SolutionRepository: Send + Sync {
    /// Insert or replace the vote of `solution.agent`
    async fn upsert(&self, solution: &Solution) -> Result<(), RepositoryError>;

    async fn find_by_agent(
        &self,
        experiment: ExperimentId,
        agent: AgentIndex,
    ) -> Result<Option<Solution>, RepositoryError>;

    /// All votes of an experiment, most recently updated first
    async fn list_by_experiment(&self, experiment: ExperimentId) -> Result<Vec<Solution>, RepositoryError>;

    async fn delete_by_experiment(&self, experiment: ExperimentId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append(&self, message: &AgentMessage) -> Result<(), RepositoryError>;

    /// History of one agent ordered by position
    async fn list_for_agent(
        &self,
        experiment: ExperimentId,
        agent: AgentIndex,
    ) -> Result<Vec<AgentMessage>, RepositoryError>;

    /// Accumulated dollar cost across all agents
    async fn total_cost(&self, experiment: ExperimentId) -> Result<f64, RepositoryError>;

    /// Summed token usage for the experiment, or for a single agent
    async fn token_usage(
        &self,
        experiment: ExperimentId,
        agent: Option<AgentIndex>,
    ) -> Result<TokenUsage, RepositoryError>;

    async fn delete_by_experiment(&self, experiment: ExperimentId) -> Result<(), RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return RepositoryError::Conflict(db_err.message().to_string());
            }
        }
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
