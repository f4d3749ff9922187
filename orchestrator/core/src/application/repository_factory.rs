// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on storage backend configuration,
//! keeping the Domain Layer free of infrastructure dependencies:
//! - Domain layer: Defines repository traits (pure interfaces)
//! - Application layer: Implements factories that create repository instances
//! - Infrastructure layer: Provides concrete implementations
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Wire the record store and content store selected in configuration

use anyhow::Result;
use std::sync::Arc;

use crate::domain::content::ContentStore;
use crate::domain::node_config::StorageConfig;
use crate::domain::repository::{
    ExperimentRepository, MessageRepository, PublicationRepository, ReviewRepository,
    SolutionRepository, StorageBackend,
};
use crate::infrastructure::content_store::FsContentStore;
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{
    InMemoryExperimentRepository, InMemoryMessageRepository, InMemoryPublicationRepository,
    InMemoryReviewRepository, InMemorySolutionRepository, PostgresExperimentRepository,
    PostgresMessageRepository, PostgresPublicationRepository, PostgresReviewRepository,
    PostgresSolutionRepository,
};

/// Every store an experiment touches
#[derive(Clone)]
pub struct Repositories {
    pub experiments: Arc<dyn ExperimentRepository>,
    pub publications: Arc<dyn PublicationRepository>,
    pub reviews: Arc<dyn ReviewRepository>,
    pub solutions: Arc<dyn SolutionRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub content: Arc<dyn ContentStore>,
}

impl Repositories {
    /// Connect to the configured backend, applying migrations for PostgreSQL
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let content: Arc<dyn ContentStore> = Arc::new(FsContentStore::new(&config.content_root));
        match config.to_backend() {
            StorageBackend::InMemory => {
                tracing::warn!("Using in-memory record store; experiment state is lost on exit");
                Ok(Self::in_memory(content))
            }
            StorageBackend::PostgreSQL(pg) => {
                let db = Database::connect_and_migrate(&pg.connection_string).await?;
                Ok(Self::postgres(&db, content))
            }
        }
    }

    pub fn in_memory(content: Arc<dyn ContentStore>) -> Self {
        Self {
            experiments: Arc::new(InMemoryExperimentRepository::new()),
            publications: Arc::new(InMemoryPublicationRepository::new()),
            reviews: Arc::new(InMemoryReviewRepository::new()),
            solutions: Arc::new(InMemorySolutionRepository::new()),
            messages: Arc::new(InMemoryMessageRepository::new()),
            content,
        }
    }

    pub fn postgres(db: &Database, content: Arc<dyn ContentStore>) -> Self {
        let pool = db.get_pool().clone();
        Self {
            experiments: Arc::new(PostgresExperimentRepository::new(pool.clone())),
            publications: Arc::new(PostgresPublicationRepository::new(pool.clone())),
            reviews: Arc::new(PostgresReviewRepository::new(pool.clone())),
            solutions: Arc::new(PostgresSolutionRepository::new(pool.clone())),
            messages: Arc::new(PostgresMessageRepository::new(pool)),
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node_config::StorageBackendKind;

    #[tokio::test]
    async fn test_in_memory_backend_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            backend: StorageBackendKind::InMemory,
            database_url: None,
            content_root: dir.path().to_string_lossy().into_owned(),
        };
        let repos = Repositories::from_config(&config).await.unwrap();
        assert!(repos.experiments.list_all().await.unwrap().is_empty());
    }
}
