// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! This module provides infrastructure implementations of repository abstractions
//! defined in the domain layer, following the Repository pattern from DDD.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve domain aggregates
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! ## PostgreSQL Repositories
//!
//! Persistent implementations backed by PostgreSQL:
//! - **PostgresExperimentRepository** - Experiment definitions
//! - **PostgresPublicationRepository** - Publications and the citation graph
//! - **PostgresReviewRepository** - Review requests and grades
//! - **PostgresSolutionRepository** - Solution votes
//! - **PostgresMessageRepository** - Agent conversations, token usage and cost
//!
//! ## In-Memory Repositories
//!
//! Lightweight implementations for testing and development. Each one keeps
//! its state behind a single lock, so compound operations such as
//! `PublicationRepository::finalize` are atomic.
//!
//! # Usage
//!
//! ```no_run
//! use agora_orchestrator_core::domain::experiment::ExperimentId;
//! use agora_orchestrator_core::domain::publication::Reference;
//! use agora_orchestrator_core::domain::repository::PublicationRepository;
//! use agora_orchestrator_core::infrastructure::repositories::PostgresPublicationRepository;
//! use sqlx::PgPool;
//!
//! async fn lookup(database_url: &str, experiment_id: ExperimentId) -> anyhow::Result<()> {
//!     let pool = PgPool::connect(database_url).await?;
//!     let repo = PostgresPublicationRepository::new(pool);
//!
//!     let reference = Reference::parse("abc123").map_err(anyhow::Error::msg)?;
//!     let _publication = repo.find_by_reference(experiment_id, &reference).await?;
//!     Ok(())
//! }
//! ```

pub mod postgres_experiment;
pub mod postgres_message;
pub mod postgres_publication;
pub mod postgres_review;
pub mod postgres_solution;

pub use postgres_experiment::PostgresExperimentRepository;
pub use postgres_message::PostgresMessageRepository;
pub use postgres_publication::PostgresPublicationRepository;
pub use postgres_review::PostgresReviewRepository;
pub use postgres_solution::PostgresSolutionRepository;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::conversation::AgentMessage;
use crate::domain::experiment::{AgentIndex, Experiment, ExperimentId};
use crate::domain::llm::TokenUsage;
use crate::domain::publication::{
    Citation, Grade, ListOrder, Publication, PublicationId, PublicationStatus, Reference, Review,
};
use crate::domain::repository::{
    ExperimentRepository, MessageRepository, PublicationRepository, RepositoryError,
    ReviewRepository, SolutionRepository,
};
use crate::domain::solution::Solution;

#[derive(Clone, Default)]
pub struct InMemoryExperimentRepository {
    experiments: Arc<RwLock<HashMap<ExperimentId, Experiment>>>,
}

impl InMemoryExperimentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExperimentRepository for InMemoryExperimentRepository {
    async fn create(&self, experiment: &Experiment) -> Result<(), RepositoryError> {
        let mut experiments = self.experiments.write();
        if experiments.values().any(|e| e.name == experiment.name) {
            return Err(RepositoryError::Conflict(format!(
                "Experiment '{}' already exists",
                experiment.name
            )));
        }
        experiments.insert(experiment.id, experiment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ExperimentId) -> Result<Option<Experiment>, RepositoryError> {
        Ok(self.experiments.read().get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Experiment>, RepositoryError> {
        Ok(self.experiments.read().values().find(|e| e.name == name).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Experiment>, RepositoryError> {
        let mut experiments: Vec<Experiment> = self.experiments.read().values().cloned().collect();
        experiments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(experiments)
    }

    async fn delete(&self, id: ExperimentId) -> Result<(), RepositoryError> {
        self.experiments.write().remove(&id);
        Ok(())
    }
}

#[derive(Default)]
struct PublicationStore {
    publications: HashMap<PublicationId, Publication>,
    citations: Vec<Citation>,
}

impl PublicationStore {
    fn citation_count(&self, id: PublicationId) -> u64 {
        self.citations.iter().filter(|c| c.to == id).count() as u64
    }
}

#[derive(Clone, Default)]
pub struct InMemoryPublicationRepository {
    store: Arc<RwLock<PublicationStore>>,
}

impl InMemoryPublicationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(publications: &mut [Publication]) {
    publications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[async_trait]
impl PublicationRepository for InMemoryPublicationRepository {
    async fn insert(&self, publication: &Publication) -> Result<(), RepositoryError> {
        let mut store = self.store.write();
        let taken = store.publications.values().any(|p| {
            p.experiment_id == publication.experiment_id && p.reference == publication.reference
        });
        if taken {
            return Err(RepositoryError::Conflict(format!(
                "Reference {} already exists",
                publication.reference
            )));
        }
        store.publications.insert(publication.id, publication.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: PublicationId) -> Result<Option<Publication>, RepositoryError> {
        Ok(self.store.read().publications.get(&id).cloned())
    }

    async fn find_by_reference(
        &self,
        experiment: ExperimentId,
        reference: &Reference,
    ) -> Result<Option<Publication>, RepositoryError> {
        Ok(self
            .store
            .read()
            .publications
            .values()
            .find(|p| p.experiment_id == experiment && &p.reference == reference)
            .cloned())
    }

    async fn find_by_references(
        &self,
        experiment: ExperimentId,
        references: &[Reference],
    ) -> Result<Vec<Publication>, RepositoryError> {
        Ok(self
            .store
            .read()
            .publications
            .values()
            .filter(|p| p.experiment_id == experiment && references.contains(&p.reference))
            .cloned()
            .collect())
    }

    async fn find_by_ids(&self, ids: &[PublicationId]) -> Result<Vec<Publication>, RepositoryError> {
        let store = self.store.read();
        Ok(ids.iter().filter_map(|id| store.publications.get(id).cloned()).collect())
    }

    async fn list_by_status(
        &self,
        experiment: ExperimentId,
        status: PublicationStatus,
        order: ListOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Publication>, RepositoryError> {
        let store = self.store.read();
        let mut matching: Vec<Publication> = store
            .publications
            .values()
            .filter(|p| p.experiment_id == experiment && p.status == status)
            .cloned()
            .collect();
        newest_first(&mut matching);
        if order == ListOrder::Citations {
            matching.sort_by_key(|p| std::cmp::Reverse(store.citation_count(p.id)));
        }
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_by_author(
        &self,
        experiment: ExperimentId,
        author: AgentIndex,
    ) -> Result<Vec<Publication>, RepositoryError> {
        let mut publications: Vec<Publication> = self
            .store
            .read()
            .publications
            .values()
            .filter(|p| p.experiment_id == experiment && p.author == author)
            .cloned()
            .collect();
        newest_first(&mut publications);
        Ok(publications)
    }

    async fn finalize(
        &self,
        id: PublicationId,
        status: PublicationStatus,
        citations: &[Citation],
    ) -> Result<bool, RepositoryError> {
        let mut store = self.store.write();
        let publication = store
            .publications
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Publication {}", id.0)))?;
        if publication.status != PublicationStatus::Submitted {
            return Ok(false);
        }
        publication.status = status;
        publication.updated_at = Utc::now();
        for citation in citations {
            if !store.citations.contains(citation) {
                store.citations.push(*citation);
            }
        }
        Ok(true)
    }

    async fn citation_count(&self, id: PublicationId) -> Result<u64, RepositoryError> {
        Ok(self.store.read().citation_count(id))
    }

    async fn citations_from(&self, id: PublicationId) -> Result<Vec<Citation>, RepositoryError> {
        Ok(self
            .store
            .read()
            .citations
            .iter()
            .filter(|c| c.from == id)
            .copied()
            .collect())
    }

    async fn delete(&self, id: PublicationId) -> Result<(), RepositoryError> {
        let mut store = self.store.write();
        store.publications.remove(&id);
        store.citations.retain(|c| c.from != id && c.to != id);
        Ok(())
    }

    async fn delete_by_experiment(&self, experiment: ExperimentId) -> Result<(), RepositoryError> {
        let mut store = self.store.write();
        store.publications.retain(|_, p| p.experiment_id != experiment);
        store.citations.retain(|c| c.experiment_id != experiment);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryReviewRepository {
    reviews: Arc<RwLock<HashMap<PublicationId, Vec<Review>>>>,
}

impl InMemoryReviewRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReviewRepository for InMemoryReviewRepository {
    async fn create_requests(&self, publication: PublicationId, reviews: &[Review]) -> Result<(), RepositoryError> {
        let mut all = self.reviews.write();
        if all.contains_key(&publication) {
            return Err(RepositoryError::Conflict(format!(
                "Reviews already requested for publication {}",
                publication.0
            )));
        }
        all.insert(publication, reviews.to_vec());
        Ok(())
    }

    async fn find_by_publication(&self, publication: PublicationId) -> Result<Vec<Review>, RepositoryError> {
        Ok(self.reviews.read().get(&publication).cloned().unwrap_or_default())
    }

    async fn submit(
        &self,
        publication: PublicationId,
        reviewer: AgentIndex,
        grade: Grade,
        content: &str,
    ) -> Result<Option<Review>, RepositoryError> {
        let mut all = self.reviews.write();
        let review = all
            .get_mut(&publication)
            .and_then(|reviews| reviews.iter_mut().find(|r| r.reviewer == reviewer && r.is_pending()));
        Ok(review.map(|review| {
            review.grade = Some(grade);
            review.content = Some(content.to_string());
            review.updated_at = Utc::now();
            review.clone()
        }))
    }

    async fn find_pending_by_reviewer(
        &self,
        experiment: ExperimentId,
        reviewer: AgentIndex,
    ) -> Result<Vec<Review>, RepositoryError> {
        Ok(self
            .reviews
            .read()
            .values()
            .flatten()
            .filter(|r| r.experiment_id == experiment && r.reviewer == reviewer && r.is_pending())
            .cloned()
            .collect())
    }

    async fn delete_by_experiment(&self, experiment: ExperimentId) -> Result<(), RepositoryError> {
        self.reviews
            .write()
            .retain(|_, reviews| reviews.iter().all(|r| r.experiment_id != experiment));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySolutionRepository {
    solutions: Arc<RwLock<HashMap<(ExperimentId, AgentIndex), Solution>>>,
}

impl InMemorySolutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SolutionRepository for InMemorySolutionRepository {
    async fn upsert(&self, solution: &Solution) -> Result<(), RepositoryError> {
        let mut solutions = self.solutions.write();
        solutions
            .entry((solution.experiment_id, solution.agent))
            .and_modify(|existing| {
                existing.publication_id = solution.publication_id;
                existing.updated_at = solution.updated_at;
            })
            .or_insert_with(|| solution.clone());
        Ok(())
    }

    async fn find_by_agent(
        &self,
        experiment: ExperimentId,
        agent: AgentIndex,
    ) -> Result<Option<Solution>, RepositoryError> {
        Ok(self.solutions.read().get(&(experiment, agent)).cloned())
    }

    async fn list_by_experiment(&self, experiment: ExperimentId) -> Result<Vec<Solution>, RepositoryError> {
        let mut solutions: Vec<Solution> = self
            .solutions
            .read()
            .values()
            .filter(|s| s.experiment_id == experiment)
            .cloned()
            .collect();
        solutions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(solutions)
    }

    async fn delete_by_experiment(&self, experiment: ExperimentId) -> Result<(), RepositoryError> {
        self.solutions.write().retain(|(e, _), _| *e != experiment);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryMessageRepository {
    messages: Arc<RwLock<Vec<AgentMessage>>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn append(&self, message: &AgentMessage) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write();
        let taken = messages.iter().any(|m| {
            m.experiment_id == message.experiment_id
                && m.agent == message.agent
                && m.position == message.position
        });
        if taken {
            return Err(RepositoryError::Conflict(format!(
                "Message position {} already used by agent {}",
                message.position, message.agent
            )));
        }
        messages.push(message.clone());
        Ok(())
    }

    async fn list_for_agent(
        &self,
        experiment: ExperimentId,
        agent: AgentIndex,
    ) -> Result<Vec<AgentMessage>, RepositoryError> {
        let mut history: Vec<AgentMessage> = self
            .messages
            .read()
            .iter()
            .filter(|m| m.experiment_id == experiment && m.agent == agent)
            .cloned()
            .collect();
        history.sort_by_key(|m| m.position);
        Ok(history)
    }

    async fn total_cost(&self, experiment: ExperimentId) -> Result<f64, RepositoryError> {
        Ok(self
            .messages
            .read()
            .iter()
            .filter(|m| m.experiment_id == experiment)
            .map(|m| m.cost)
            .sum())
    }

    async fn token_usage(
        &self,
        experiment: ExperimentId,
        agent: Option<AgentIndex>,
    ) -> Result<TokenUsage, RepositoryError> {
        Ok(self
            .messages
            .read()
            .iter()
            .filter(|m| m.experiment_id == experiment && agent.is_none_or(|a| m.agent == a))
            .filter_map(|m| m.usage)
            .sum())
    }

    async fn delete_by_experiment(&self, experiment: ExperimentId) -> Result<(), RepositoryError> {
        self.messages.write().retain(|m| m.experiment_id != experiment);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::Message;

    fn publication(experiment: ExperimentId, reference: &str) -> Publication {
        Publication::new(experiment, AgentIndex(0), "t", Reference::parse(reference).unwrap(), vec![])
    }

    #[tokio::test]
    async fn test_reference_is_unique_per_experiment() {
        let repo = InMemoryPublicationRepository::new();
        let experiment = ExperimentId::new();
        repo.insert(&publication(experiment, "aaaaaa")).await.unwrap();
        let err = repo.insert(&publication(experiment, "aaaaaa")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        repo.insert(&publication(ExperimentId::new(), "aaaaaa")).await.unwrap();
    }

    #[tokio::test]
    async fn test_finalize_applies_once() {
        let repo = InMemoryPublicationRepository::new();
        let experiment = ExperimentId::new();
        let cited = publication(experiment, "aaaaaa");
        let citing = publication(experiment, "bbbbbb");
        repo.insert(&cited).await.unwrap();
        repo.insert(&citing).await.unwrap();
        let citation = Citation {
            experiment_id: experiment,
            from: citing.id,
            to: cited.id,
        };

        assert!(repo.finalize(citing.id, PublicationStatus::Published, &[citation]).await.unwrap());
        assert!(!repo.finalize(citing.id, PublicationStatus::Rejected, &[citation]).await.unwrap());
        assert_eq!(repo.citation_count(cited.id).await.unwrap(), 1);
        assert_eq!(
            repo.find_by_id(citing.id).await.unwrap().unwrap().status,
            PublicationStatus::Published
        );
    }

    #[tokio::test]
    async fn test_citation_order_breaks_ties_by_recency() {
        let repo = InMemoryPublicationRepository::new();
        let experiment = ExperimentId::new();
        let mut older = publication(experiment, "aaaaaa");
        older.created_at = Utc::now() - chrono::Duration::seconds(10);
        let newer = publication(experiment, "bbbbbb");
        let citing = publication(experiment, "cccccc");
        for p in [&older, &newer, &citing] {
            repo.insert(p).await.unwrap();
        }
        repo.finalize(older.id, PublicationStatus::Published, &[]).await.unwrap();
        repo.finalize(newer.id, PublicationStatus::Published, &[]).await.unwrap();
        repo.finalize(
            citing.id,
            PublicationStatus::Published,
            &[Citation { experiment_id: experiment, from: citing.id, to: older.id }],
        )
        .await
        .unwrap();

        let latest = repo
            .list_by_status(experiment, PublicationStatus::Published, ListOrder::Latest, 10, 0)
            .await
            .unwrap();
        assert_eq!(latest[2].id, older.id);

        let cited = repo
            .list_by_status(experiment, PublicationStatus::Published, ListOrder::Citations, 10, 0)
            .await
            .unwrap();
        assert_eq!(cited[0].id, older.id);
        assert_eq!(cited.len(), 3);

        let page = repo
            .list_by_status(experiment, PublicationStatus::Published, ListOrder::Citations, 1, 1)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_review_submit_only_matches_pending() {
        let repo = InMemoryReviewRepository::new();
        let p = publication(ExperimentId::new(), "aaaaaa");
        repo.create_requests(p.id, &[Review::request(&p, AgentIndex(1))]).await.unwrap();
        assert!(repo.create_requests(p.id, &[]).await.is_err());

        assert!(repo.submit(p.id, AgentIndex(2), Grade::Accept, "x").await.unwrap().is_none());
        let graded = repo.submit(p.id, AgentIndex(1), Grade::Reject, "no").await.unwrap().unwrap();
        assert_eq!(graded.grade, Some(Grade::Reject));
        assert!(repo.submit(p.id, AgentIndex(1), Grade::Accept, "yes").await.unwrap().is_none());
        assert!(repo
            .find_pending_by_reviewer(p.experiment_id, AgentIndex(1))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_message_usage_and_cost() {
        let repo = InMemoryMessageRepository::new();
        let experiment = ExperimentId::new();
        let usage = TokenUsage { total: 10, input: 6, output: 4, cached: 0, thinking: 0 };
        for (agent, position) in [(0, 0), (0, 1), (1, 0)] {
            let message = AgentMessage::new(experiment, AgentIndex(agent), position, Message::user_text("hi"))
                .with_usage(usage, 0.5);
            repo.append(&message).await.unwrap();
        }
        let duplicate = AgentMessage::new(experiment, AgentIndex(0), 1, Message::user_text("again"));
        assert!(repo.append(&duplicate).await.is_err());

        assert_eq!(repo.total_cost(experiment).await.unwrap(), 1.5);
        assert_eq!(repo.token_usage(experiment, None).await.unwrap().total, 30);
        assert_eq!(repo.token_usage(experiment, Some(AgentIndex(1))).await.unwrap().total, 10);
        assert_eq!(repo.list_for_agent(experiment, AgentIndex(0)).await.unwrap().len(), 2);
    }
}
