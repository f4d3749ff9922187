// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Filesystem Content Store
//!
//! Stores publication bodies and attachments on the local filesystem:
//!
//! ```text
//! <root>/<experiment>/publications/<reference>/publication.md
//! <root>/<experiment>/publications/<reference>/attachments/<file>
//! ```
//!
//! Bodies are written with `create_new`, so two submissions racing for the
//! same reference cannot overwrite each other.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::content::{attachment_name, ContentError, ContentStore};
use crate::domain::experiment::ExperimentId;
use crate::domain::publication::Reference;

const BODY_FILE: &str = "publication.md";
const ATTACHMENTS_DIR: &str = "attachments";

pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn experiment_dir(&self, experiment: ExperimentId) -> PathBuf {
        self.root.join(experiment.to_string())
    }

    fn publication_dir(&self, experiment: ExperimentId, reference: &Reference) -> PathBuf {
        self.experiment_dir(experiment)
            .join("publications")
            .join(reference.as_str())
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn write(&self, experiment: ExperimentId, reference: &Reference, content: &str) -> Result<(), ContentError> {
        let dir = self.publication_dir(experiment, reference);
        fs::create_dir_all(&dir).await?;

        let path = dir.join(BODY_FILE);
        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ContentError::AlreadyExists(reference.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        debug!(reference = %reference, bytes = content.len(), "Publication content stored");
        Ok(())
    }

    async fn read(&self, experiment: ExperimentId, reference: &Reference) -> Result<String, ContentError> {
        let path = self.publication_dir(experiment, reference).join(BODY_FILE);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ContentError::NotFound(reference.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn attachments_dir(&self, experiment: ExperimentId, reference: &Reference) -> PathBuf {
        self.publication_dir(experiment, reference).join(ATTACHMENTS_DIR)
    }

    async fn attach(&self, experiment: ExperimentId, reference: &Reference, files: &[PathBuf]) -> Result<(), ContentError> {
        if files.is_empty() {
            return Ok(());
        }
        let dir = self.attachments_dir(experiment, reference);
        fs::create_dir_all(&dir).await?;
        for file in files {
            let name = attachment_name(file)?;
            fs::copy(file, dir.join(name)).await?;
        }
        debug!(reference = %reference, files = files.len(), "Attachments stored");
        Ok(())
    }

    async fn list_attachments(&self, experiment: ExperimentId, reference: &Reference) -> Result<Vec<String>, ContentError> {
        let dir = self.attachments_dir(experiment, reference);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, experiment: ExperimentId, reference: &Reference) -> Result<(), ContentError> {
        match fs::remove_dir_all(self.publication_dir(experiment, reference)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_experiment(&self, experiment: ExperimentId) -> Result<(), ContentError> {
        match fs::remove_dir_all(self.experiment_dir(experiment)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(s: &str) -> Reference {
        Reference::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_write_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path());
        let experiment = ExperimentId::new();

        store.write(experiment, &reference("abc123"), "first").await.unwrap();
        let err = store.write(experiment, &reference("abc123"), "second").await.unwrap_err();
        assert!(matches!(err, ContentError::AlreadyExists(_)));
        assert_eq!(store.read(experiment, &reference("abc123")).await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_missing_content_and_attachments() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path());
        let experiment = ExperimentId::new();

        assert!(matches!(
            store.read(experiment, &reference("zzz999")).await,
            Err(ContentError::NotFound(_))
        ));
        assert!(store.list_attachments(experiment, &reference("zzz999")).await.unwrap().is_empty());
        store.delete_experiment(experiment).await.unwrap();
    }

    #[tokio::test]
    async fn test_attachments_listed_sorted_and_removed_with_experiment() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path());
        let experiment = ExperimentId::new();
        let r = reference("abc123");

        let attachments = store.attachments_dir(experiment, &r);
        std::fs::create_dir_all(&attachments).unwrap();
        std::fs::write(attachments.join("proof.lean"), "x").unwrap();
        std::fs::write(attachments.join("data.csv"), "y").unwrap();

        assert_eq!(
            store.list_attachments(experiment, &r).await.unwrap(),
            vec!["data.csv".to_string(), "proof.lean".to_string()]
        );

        store.delete_experiment(experiment).await.unwrap();
        assert!(!attachments.exists());
    }

    #[tokio::test]
    async fn test_attach_copies_files_and_delete_removes_publication() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path().join("store"));
        let experiment = ExperimentId::new();
        let r = reference("abc123");

        let staged = dir.path().join("staged");
        std::fs::create_dir_all(&staged).unwrap();
        std::fs::write(staged.join("proof.lean"), "theorem").unwrap();

        store.write(experiment, &r, "body").await.unwrap();
        store.attach(experiment, &r, &[staged.join("proof.lean")]).await.unwrap();
        assert_eq!(store.list_attachments(experiment, &r).await.unwrap(), vec!["proof.lean".to_string()]);

        store.delete(experiment, &r).await.unwrap();
        assert!(matches!(store.read(experiment, &r).await, Err(ContentError::NotFound(_))));
        assert!(store.list_attachments(experiment, &r).await.unwrap().is_empty());
        store.delete(experiment, &r).await.unwrap();
    }

    #[test]
    fn test_attachment_names_stay_inside_directory() {
        use std::path::Path;
        assert_eq!(attachment_name(Path::new("/home/agent/out/data.csv")).unwrap(), "data.csv");
        assert!(attachment_name(Path::new("/home/agent/..")).is_err());
        assert!(attachment_name(Path::new("/")).is_err());
    }
}
