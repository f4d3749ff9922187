// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Content store contract
//!
//! Publication bodies and attachments are stored outside the record store,
//! addressed by the publication's reference token.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Content store interface and errors

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::domain::experiment::ExperimentId;
use crate::domain::publication::Reference;

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Content already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid attachment name: {0}")]
    InvalidName(String),

    #[error("Content I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ContentError {
    fn from(err: std::io::Error) -> Self {
        ContentError::Io(err.to_string())
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `content` under `reference`; fails with `AlreadyExists` rather
    /// than overwrite
    async fn write(&self, experiment: ExperimentId, reference: &Reference, content: &str) -> Result<(), ContentError>;

    async fn read(&self, experiment: ExperimentId, reference: &Reference) -> Result<String, ContentError>;

    /// Directory holding the attachments of `reference`
    fn attachments_dir(&self, experiment: ExperimentId, reference: &Reference) -> PathBuf;

    /// Copy host `files` into the attachments of `reference`, keeping their
    /// file names
    async fn attach(&self, experiment: ExperimentId, reference: &Reference, files: &[PathBuf]) -> Result<(), ContentError>;

    /// File names attached to `reference`, sorted
    async fn list_attachments(&self, experiment: ExperimentId, reference: &Reference) -> Result<Vec<String>, ContentError>;

    /// Remove the body and attachments of `reference`
    async fn delete(&self, experiment: ExperimentId, reference: &Reference) -> Result<(), ContentError>;

    /// Remove everything stored for an experiment
    async fn delete_experiment(&self, experiment: ExperimentId) -> Result<(), ContentError>;
}

/// File name an attachment is stored under; rejects names that would
/// escape the attachments directory
pub fn attachment_name(path: &Path) -> Result<&str, ContentError> {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) if !name.is_empty() && name != "." && name != ".." => Ok(name),
        _ => Err(ContentError::InvalidName(path.display().to_string())),
    }
}
