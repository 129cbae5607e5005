//! Standalone container flow
//!
//! Runs the GFD image once with a scratch directory mounted where NFD reads
//! feature files, waits for GFD to write its output file, then checks every
//! line of it against the expected-output patterns. No noise filter applies
//! here: the file only ever holds GFD's own labels.

use std::io::Write;
use tracing::{info, instrument, warn};

use crate::config::IntegrationConfig;
use crate::container::{Container, ContainerRuntime, ContainerStatus, Mount, RuntimeError};
use crate::labels::{self, LabelsError};
use crate::output::{OutputError, OutputOutcome, OutputWatcher};
use crate::reconcile::{Reconciler, Reconciliation};

/// Error type for the standalone flow
#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("container exited ({status}) before writing {path}")]
    ContainerExited { status: ContainerStatus, path: String },

    #[error(transparent)]
    Labels(#[from] LabelsError),
}

/// What one standalone run observed
#[derive(Debug, Clone)]
pub struct IntegrationReport {
    /// The container that ran the image
    pub container: Container,
    /// Why the output wait stopped
    pub outcome: OutputOutcome,
    /// The final label check
    pub reconciliation: Reconciliation,
}

impl IntegrationReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.reconciliation.passed()
    }
}

/// Run the standalone flow on a container runtime
///
/// The container's logs are written to `log_sink` once the wait is over,
/// whether or not the output file showed up. A failed write is logged and
/// does not keep the container from being stopped. The container is always
/// stopped before the output file is read.
#[instrument(skip_all, fields(image = %config.image, runtime = runtime.name()))]
pub async fn run<W: Write>(
    runtime: &dyn ContainerRuntime,
    config: &IntegrationConfig,
    log_sink: &mut W,
) -> Result<IntegrationReport, IntegrationError> {
    let expected = labels::read_expected_file(&config.expected_output).await?;

    let scratch = tempfile::Builder::new()
        .prefix("gfd-integration-")
        .tempdir()?;
    let output_path = scratch.path().join(&config.output_file);

    info!("Running GFD");
    let mounts = [Mount::bind(scratch.path(), &config.mount_target)];
    let container = runtime.run(&config.image, &mounts).await?;

    let watcher = OutputWatcher::new(&output_path)
        .interval(config.poll_interval)
        .timeout(config.poll_timeout);
    info!(path = %watcher.path().display(), "Waiting for GFD output file");
    let waited = watcher.wait_for_container(runtime, &container).await;

    match runtime.logs(&container).await {
        Ok(logs) => {
            if let Err(e) = writeln!(log_sink, "Container logs:\n{logs}") {
                warn!(error = %e, "Could not write container logs");
            }
        }
        Err(e) => warn!(error = %e, "Could not fetch container logs"),
    }

    let stopped = runtime.stop(&container).await;
    let outcome = waited?;
    stopped?;

    let observed = match labels::read_output_file(&output_path).await {
        Ok(observed) => observed,
        Err(e) => {
            return Err(match outcome {
                OutputOutcome::ContainerStopped { status } => IntegrationError::ContainerExited {
                    status,
                    path: output_path.display().to_string(),
                },
                OutputOutcome::Written { .. } => e.into(),
            })
        }
    };
    info!(labels = observed.len(), "Checking labels");

    let reconciliation = Reconciler::new()
        .strategy(config.strategy)
        .reconcile(&expected, &observed);

    Ok(IntegrationReport {
        container,
        outcome,
        reconciliation,
    })
}
