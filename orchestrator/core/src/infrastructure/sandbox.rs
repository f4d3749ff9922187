// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Docker Sandbox Backend
//!
//! Runs each agent's computer as a long-lived Docker container built from
//! `<profiles_dir>/<profile>/Dockerfile`. Commands run through `bash -lc` in
//! the agent's home directory; files move in and out as tar archives.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, UploadToContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::BuildImageOptions;
use bollard::Docker;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::domain::experiment::Profile;
use crate::domain::sandbox::{ExecOutput, ExecRequest, Sandbox, SandboxError, SandboxId, SANDBOX_HOME};

pub struct DockerSandbox {
    docker: Docker,
    profiles_dir: PathBuf,
    network_mode: Option<String>,
}

fn status_code(error: &DockerError) -> Option<u16> {
    match error {
        DockerError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

impl DockerSandbox {
    pub fn new(
        socket_path: Option<String>,
        profiles_dir: impl Into<PathBuf>,
        network_mode: Option<String>,
    ) -> Result<Self, SandboxError> {
        // Connect to Docker daemon (custom socket or auto-detect)
        let docker = if let Some(path) = socket_path {
            #[cfg(unix)]
            let result = Docker::connect_with_unix(&path, 120, bollard::API_DEFAULT_VERSION);

            #[cfg(windows)]
            let result = Docker::connect_with_named_pipe(&path, 120, bollard::API_DEFAULT_VERSION);

            result.map_err(|e| {
                SandboxError::CreateFailed(format!(
                    "Failed to connect to Docker at {}: {}\n\n\
                     Ensure Docker is running and the socket path is correct.",
                    path, e
                ))
            })?
        } else {
            Docker::connect_with_local_defaults().map_err(|e| {
                SandboxError::CreateFailed(format!(
                    "Failed to connect to Docker: {}\n\n\
                     Ensure the Docker daemon is running (check: docker ps)",
                    e
                ))
            })?
        };

        Ok(Self {
            docker,
            profiles_dir: profiles_dir.into(),
            network_mode,
        })
    }

    /// Verify Docker daemon is accessible
    pub async fn healthcheck(&self) -> Result<(), SandboxError> {
        self.docker
            .ping()
            .await
            .map_err(|e| SandboxError::CreateFailed(format!("Cannot connect to Docker daemon: {}", e)))?;
        Ok(())
    }

    async fn is_running(&self, id: &str) -> Result<Option<bool>, SandboxError> {
        match self.docker.inspect_container(id, None).await {
            Ok(inspect) => Ok(Some(inspect.state.and_then(|s| s.running).unwrap_or(false))),
            Err(e) if status_code(&e) == Some(404) => Ok(None),
            Err(e) => Err(SandboxError::CreateFailed(e.to_string())),
        }
    }

    async fn run_exec(&self, id: &str, request: &ExecRequest) -> Result<ExecOutput, SandboxError> {
        let env: Vec<String> = request.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        let exec_config = CreateExecOptions {
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            cmd: Some(vec!["/bin/bash".to_string(), "-lc".to_string(), request.command.clone()]),
            env: Some(env),
            working_dir: Some(SANDBOX_HOME.to_string()),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(id, exec_config)
            .await
            .map_err(|e| SandboxError::ExecutionFailed(e.to_string()))?;

        let res = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| SandboxError::ExecutionFailed(e.to_string()))?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let StartExecResults::Attached { mut output, .. } = res {
            while let Some(msg) = output.next().await {
                match msg {
                    Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {}
                    Err(e) => return Err(SandboxError::ExecutionFailed(e.to_string())),
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| SandboxError::ExecutionFailed(format!("Failed to inspect exec: {}", e)))?;

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code: inspect.exit_code.unwrap_or(0),
        })
    }
}

fn archive_dir(dir: PathBuf) -> Result<Vec<u8>, std::io::Error> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_dir_all(".", &dir)?;
    builder.into_inner()
}

fn archive_path(local: PathBuf) -> Result<Vec<u8>, std::io::Error> {
    let name = local
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut builder = tar::Builder::new(Vec::new());
    if local.is_dir() {
        builder.append_dir_all(&name, &local)?;
    } else {
        builder.append_path_with_name(&local, &name)?;
    }
    builder.into_inner()
}

/// Unpack an archive whose entries share one top-level name onto `local`
fn unpack_single(archive: Vec<u8>, local: PathBuf) -> Result<(), std::io::Error> {
    let mut archive = tar::Archive::new(archive.as_slice());
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let rest: PathBuf = path
            .components()
            .skip(1)
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        let target = local.join(rest);
        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
    }
    Ok(())
}

async fn blocking<T, F>(f: F) -> Result<T, SandboxError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, std::io::Error> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SandboxError::TransferFailed(e.to_string()))?
        .map_err(|e| SandboxError::TransferFailed(e.to_string()))
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn build_image(&self, profile: Profile) -> Result<String, SandboxError> {
        let image = profile.image_name();
        let context_dir = self.profiles_dir.join(profile.as_str());
        if !context_dir.join("Dockerfile").exists() {
            return Err(SandboxError::ImageBuildFailed(format!(
                "No Dockerfile found at {}",
                context_dir.join("Dockerfile").display()
            )));
        }

        let context = tokio::task::spawn_blocking(move || archive_dir(context_dir))
            .await
            .map_err(|e| SandboxError::ImageBuildFailed(e.to_string()))?
            .map_err(|e| SandboxError::ImageBuildFailed(format!("Failed to archive build context: {}", e)))?;

        info!("Building sandbox image: {}", image);
        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: image.clone(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(Bytes::from(context)));
        while let Some(result) = stream.next().await {
            let info = result.map_err(|e| SandboxError::ImageBuildFailed(format!("{}: {}", image, e)))?;
            if let Some(error) = info.error {
                return Err(SandboxError::ImageBuildFailed(format!("{}: {}", image, error)));
            }
            if let Some(line) = info.stream.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
                debug!(image = %image, "{}", line);
            }
        }

        Ok(image)
    }

    async fn create(&self, id: &str, image: &str) -> Result<SandboxId, SandboxError> {
        match self.is_running(id).await? {
            Some(true) => {
                debug!(sandbox = id, "Sandbox already running");
                return Ok(SandboxId::new(id));
            }
            Some(false) => {
                self.docker
                    .start_container(id, None::<StartContainerOptions<String>>)
                    .await
                    .map_err(|e| SandboxError::CreateFailed(format!("Failed to restart {}: {}", id, e)))?;
                info!("Restarted sandbox: {}", id);
                return Ok(SandboxId::new(id));
            }
            None => {}
        }

        let host_config = bollard::models::HostConfig {
            network_mode: self.network_mode.clone(),
            ..Default::default()
        };

        // Keep container alive; commands run through exec
        let config = Config {
            image: Some(image.to_string()),
            tty: Some(true),
            cmd: Some(vec!["tail".to_string(), "-f".to_string(), "/dev/null".to_string()]),
            working_dir: Some(SANDBOX_HOME.to_string()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: id.to_string(),
            platform: None,
        };

        self.docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| SandboxError::CreateFailed(e.to_string()))?;

        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxError::CreateFailed(format!("Failed to start container: {}", e)))?;

        info!("Created sandbox: {}", id);
        Ok(SandboxId::new(id))
    }

    async fn execute(&self, handle: &SandboxId, request: ExecRequest) -> Result<ExecOutput, SandboxError> {
        match request.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_exec(handle.as_str(), &request))
                .await
                .map_err(|_| SandboxError::Timeout(limit))?,
            None => self.run_exec(handle.as_str(), &request).await,
        }
    }

    async fn copy_in(&self, handle: &SandboxId, local_path: &Path, remote_dir: &str) -> Result<(), SandboxError> {
        let local = local_path.to_path_buf();
        let archive = blocking(move || archive_path(local)).await?;

        let options = UploadToContainerOptions {
            path: remote_dir.to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(handle.as_str(), Some(options), Bytes::from(archive))
            .await
            .map_err(|e| SandboxError::TransferFailed(format!("{} -> {}: {}", local_path.display(), remote_dir, e)))?;

        debug!(sandbox = %handle.as_str(), local = %local_path.display(), remote = remote_dir, "Copied into sandbox");
        Ok(())
    }

    async fn copy_out(&self, handle: &SandboxId, remote_path: &str, local_path: &Path) -> Result<(), SandboxError> {
        let options = DownloadFromContainerOptions {
            path: remote_path.to_string(),
        };
        let chunks: Vec<Bytes> = self
            .docker
            .download_from_container(handle.as_str(), Some(options))
            .try_collect()
            .await
            .map_err(|e| match status_code(&e) {
                Some(404) => SandboxError::NotFound(remote_path.to_string()),
                _ => SandboxError::TransferFailed(format!("{}: {}", remote_path, e)),
            })?;
        let archive: Vec<u8> = chunks.concat();

        let local = local_path.to_path_buf();
        blocking(move || unpack_single(archive, local)).await?;

        debug!(sandbox = %handle.as_str(), remote = remote_path, local = %local_path.display(), "Copied out of sandbox");
        Ok(())
    }

    async fn stop(&self, handle: &SandboxId) -> Result<(), SandboxError> {
        match self
            .docker
            .stop_container(handle.as_str(), Some(StopContainerOptions { t: 5 }))
            .await
        {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(e) if matches!(status_code(&e), Some(304) | Some(404)) => Ok(()),
            Err(e) => Err(SandboxError::StopFailed(e.to_string())),
        }
    }

    async fn terminate(&self, handle: &SandboxId) -> Result<(), SandboxError> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };

        match self.docker.remove_container(handle.as_str(), Some(options)).await {
            Ok(()) => {
                info!("Terminated sandbox: {}", handle.as_str());
                Ok(())
            }
            Err(e) if status_code(&e) == Some(404) => Ok(()),
            Err(e) => Err(SandboxError::TerminationFailed(e.to_string())),
        }
    }
}
