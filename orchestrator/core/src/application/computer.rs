// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Computer
//!
//! One agent's handle on its sandbox. The container is created on first use
//! from the profile image and reused for the rest of the run. File transfer
//! goes through a scratch directory on the host.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Lazily provisioned per-agent sandbox with file helpers

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::experiment::Profile;
use crate::domain::sandbox::{ExecOutput, ExecRequest, Sandbox, SandboxError, SandboxId, SANDBOX_HOME};

pub struct AgentComputer {
    sandbox: Arc<dyn Sandbox>,
    name: String,
    profile: Profile,
    command_timeout: Duration,
    handle: OnceCell<SandboxId>,
}

impl AgentComputer {
    pub fn new(
        sandbox: Arc<dyn Sandbox>,
        name: impl Into<String>,
        profile: Profile,
        command_timeout: Duration,
    ) -> Self {
        Self {
            sandbox,
            name: name.into(),
            profile,
            command_timeout,
            handle: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_started(&self) -> bool {
        self.handle.initialized()
    }

    /// Sandbox handle, building the image and creating the container on first call
    pub async fn ensure(&self) -> Result<&SandboxId, SandboxError> {
        self.handle
            .get_or_try_init(|| async {
                let image = self.sandbox.build_image(self.profile).await?;
                let handle = self.sandbox.create(&self.name, &image).await?;
                info!(sandbox = %self.name, image = %image, "Agent computer started");
                Ok(handle)
            })
            .await
    }

    pub async fn execute(&self, command: &str, timeout: Option<Duration>) -> Result<ExecOutput, SandboxError> {
        let handle = self.ensure().await?;
        let request = ExecRequest {
            timeout: Some(timeout.unwrap_or(self.command_timeout)),
            ..ExecRequest::new(command)
        };
        debug!(sandbox = %self.name, command = %command, "Executing command");
        self.sandbox.execute(handle, request).await
    }

    pub async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        let handle = self.ensure().await?;
        let scratch = scratch_dir();
        let local = scratch.join("file");
        let result = async {
            tokio::fs::create_dir_all(&scratch).await.map_err(transfer_error)?;
            self.sandbox.copy_out(handle, &resolve(path), &local).await?;
            tokio::fs::read_to_string(&local).await.map_err(transfer_error)
        }
        .await;
        remove_scratch(&scratch).await;
        result
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let remote = resolve(path);
        let (dir, file_name) = split_remote(&remote)?;
        self.mkdir(&dir).await?;

        let handle = self.ensure().await?;
        let scratch = scratch_dir();
        let local = scratch.join(file_name);
        let result = async {
            tokio::fs::create_dir_all(&scratch).await.map_err(transfer_error)?;
            tokio::fs::write(&local, content).await.map_err(transfer_error)?;
            self.sandbox.copy_in(handle, &local, &dir).await
        }
        .await;
        remove_scratch(&scratch).await;
        result
    }

    /// Copy a host file or directory into `remote_dir`, creating it first
    pub async fn copy_in(&self, local: &Path, remote_dir: &str) -> Result<(), SandboxError> {
        let remote_dir = resolve(remote_dir);
        self.mkdir(&remote_dir).await?;
        let handle = self.ensure().await?;
        self.sandbox.copy_in(handle, local, &remote_dir).await
    }

    /// Copy the sandbox file `remote` to the host path `local`
    pub async fn copy_out(&self, remote: &str, local: &Path) -> Result<(), SandboxError> {
        let handle = self.ensure().await?;
        self.sandbox.copy_out(handle, &resolve(remote), local).await
    }

    /// Copy sandbox files to a host scratch directory. Files keep their names,
    /// which the caller must keep distinct.
    pub async fn fetch(&self, paths: &[String]) -> Result<FetchedFiles, SandboxError> {
        let handle = self.ensure().await?;
        let scratch = scratch_dir();
        let mut files = Vec::with_capacity(paths.len());
        let result = async {
            tokio::fs::create_dir_all(&scratch).await.map_err(transfer_error)?;
            for path in paths {
                let remote = resolve(path);
                let (_, name) = split_remote(&remote)?;
                let local = scratch.join(name);
                self.sandbox.copy_out(handle, &remote, &local).await?;
                files.push(local);
            }
            Ok::<_, SandboxError>(())
        }
        .await;

        match result {
            Ok(()) => Ok(FetchedFiles { dir: scratch, files }),
            Err(e) => {
                remove_scratch(&scratch).await;
                Err(e)
            }
        }
    }

    /// Stop the container if it was ever started
    pub async fn stop(&self) -> Result<(), SandboxError> {
        match self.handle.get() {
            Some(handle) => self.sandbox.stop(handle).await,
            None => Ok(()),
        }
    }

    async fn mkdir(&self, dir: &str) -> Result<(), SandboxError> {
        let output = self.execute(&format!("mkdir -p {}", shell_quote(dir)), None).await?;
        if output.exit_code != 0 {
            return Err(SandboxError::TransferFailed(format!(
                "Failed to create {}: {}",
                dir,
                output.stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Host copies of sandbox files, living until `discard`
pub struct FetchedFiles {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl FetchedFiles {
    pub fn paths(&self) -> &[PathBuf] {
        &self.files
    }

    pub async fn discard(self) {
        remove_scratch(&self.dir).await;
    }
}

/// Absolute sandbox path; relative paths are taken from the agent home
pub fn resolve(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", SANDBOX_HOME, path.trim_start_matches("./"))
    }
}

pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn split_remote(remote: &str) -> Result<(String, String), SandboxError> {
    match remote.rsplit_once('/') {
        Some((dir, name)) if !name.is_empty() => {
            let dir = if dir.is_empty() { "/" } else { dir };
            Ok((dir.to_string(), name.to_string()))
        }
        _ => Err(SandboxError::TransferFailed(format!("Invalid file path: {}", remote))),
    }
}

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("agora-{}", Uuid::new_v4()))
}

async fn remove_scratch(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %dir.display(), "Failed to remove scratch directory: {}", e);
        }
    }
}

fn transfer_error(err: std::io::Error) -> SandboxError {
    SandboxError::TransferFailed(err.to_string())
}
