//! Container runtimes for the standalone integration flow
//!
//! The integration flow runs the GFD image once with a scratch directory
//! bind-mounted where NFD would read feature files. It needs four things
//! from a runtime: start a detached container, report its status, fetch its
//! logs and stop it.
//!
//! - Docker (default): drives the `docker` CLI

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;

mod docker;

pub use docker::DockerCli;

/// Error type for container runtime operations
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Container start failed: {0}")]
    RunFailed(String),

    #[error("Container inspect failed: {0}")]
    InspectFailed(String),

    #[error("Container stop failed: {0}")]
    StopFailed(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Runtime not available: {0}")]
    NotAvailable(String),
}

/// Host directory bind-mounted into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Host path
    pub source: PathBuf,
    /// Path inside the container
    pub target: String,
}

impl Mount {
    pub fn bind(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Handle to a started container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// Runtime-assigned id
    pub id: String,
    /// Image it was started from
    pub image: String,
}

/// Container lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Other(String),
}

impl ContainerStatus {
    /// Parse a Docker `State.Status` string
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status.trim() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Other(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

/// Trait for container runtimes
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a detached container with the given bind mounts
    async fn run(&self, image: &str, mounts: &[Mount]) -> Result<Container, RuntimeError>;

    /// Current lifecycle state
    async fn status(&self, container: &Container) -> Result<ContainerStatus, RuntimeError>;

    /// Everything the container has written to stdout and stderr
    async fn logs(&self, container: &Container) -> Result<String, RuntimeError>;

    /// Stop the container
    async fn stop(&self, container: &Container) -> Result<(), RuntimeError>;

    /// Runtime name for display
    fn name(&self) -> &'static str;
}
