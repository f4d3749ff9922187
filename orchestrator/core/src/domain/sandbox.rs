// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Sandbox
//!
//! Contract for the containerised "computer" each agent issues shell commands
//! into. One sandbox per agent, never shared.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Sandbox interface, handle and errors

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::domain::experiment::Profile;

/// Home directory of the agent user inside a sandbox.
pub const SANDBOX_HOME: &str = "/home/agent";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SandboxId(pub String);

impl SandboxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ExecRequest {
    pub command: String,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl ExecRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Failed to build image: {0}")]
    ImageBuildFailed(String),
    #[error("Failed to create sandbox: {0}")]
    CreateFailed(String),
    #[error("Failed to execute command: {0}")]
    ExecutionFailed(String),
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),
    #[error("File transfer failed: {0}")]
    TransferFailed(String),
    #[error("Failed to stop sandbox: {0}")]
    StopFailed(String),
    #[error("Failed to terminate sandbox: {0}")]
    TerminationFailed(String),
    #[error("Sandbox not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Build (or rebuild) the image for `profile`, returning its name
    async fn build_image(&self, profile: Profile) -> Result<String, SandboxError>;

    /// Create and start sandbox `id` from `image`; an existing one is restarted
    async fn create(&self, id: &str, image: &str) -> Result<SandboxId, SandboxError>;

    async fn execute(&self, handle: &SandboxId, request: ExecRequest) -> Result<ExecOutput, SandboxError>;

    /// Copy a local file or directory into the sandbox under `remote_dir`
    async fn copy_in(&self, handle: &SandboxId, local_path: &Path, remote_dir: &str) -> Result<(), SandboxError>;

    /// Copy `remote_path` out of the sandbox into `local_path`
    async fn copy_out(&self, handle: &SandboxId, remote_path: &str, local_path: &Path) -> Result<(), SandboxError>;

    async fn stop(&self, handle: &SandboxId) -> Result<(), SandboxError>;

    /// Stop and remove the sandbox with its state
    async fn terminate(&self, handle: &SandboxId) -> Result<(), SandboxError>;
}
