//! Docker container runtime
//!
//! Drives the `docker` CLI, so any daemon the CLI can reach works
//! (local socket, `DOCKER_HOST`, contexts).

use async_trait::async_trait;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use super::{Container, ContainerRuntime, ContainerStatus, Mount, RuntimeError};

/// Docker CLI runtime
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Use a different CLI binary (e.g. `podman`)
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Arguments for a detached `docker run`
    fn run_args(image: &str, mounts: &[Mount]) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--detach".to_string()];

        for mount in mounts {
            args.push("--mount".to_string());
            args.push(format!(
                "type=bind,source={},target={}",
                mount.source.display(),
                mount.target
            ));
        }

        args.push(image.to_string());
        args
    }

    async fn exec(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        debug!(binary = %self.binary, ?args, "Running container CLI");

        Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    RuntimeError::NotAvailable(format!("{} not found in PATH", self.binary))
                }
                _ => RuntimeError::CommandFailed(e.to_string()),
            })
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    #[instrument(skip(self, mounts), fields(runtime = "docker"))]
    async fn run(&self, image: &str, mounts: &[Mount]) -> Result<Container, RuntimeError> {
        let args = Self::run_args(image, mounts);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = self.exec(&args).await?;
        if !output.status.success() {
            return Err(RuntimeError::RunFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(id = %id, "Started container");

        Ok(Container {
            id,
            image: image.to_string(),
        })
    }

    async fn status(&self, container: &Container) -> Result<ContainerStatus, RuntimeError> {
        let output = self
            .exec(&["inspect", "--format", "{{.State.Status}}", &container.id])
            .await?;

        if !output.status.success() {
            return Err(RuntimeError::InspectFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(ContainerStatus::parse(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn logs(&self, container: &Container) -> Result<String, RuntimeError> {
        let output = self.exec(&["logs", &container.id]).await?;

        if !output.status.success() {
            return Err(RuntimeError::InspectFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        // docker logs replays the container's stderr on its own stderr
        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    #[instrument(skip(self, container), fields(id = %container.id, runtime = "docker"))]
    async fn stop(&self, container: &Container) -> Result<(), RuntimeError> {
        let output = self.exec(&["stop", &container.id]).await?;

        if !output.status.success() {
            return Err(RuntimeError::StopFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        debug!("Container stopped");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "docker"
    }
}
