//! Wait for GFD to write its output file
//!
//! GFD writes all labels to one file inside the shared mount. The watcher
//! checks for that file once per interval and stops early if the container is
//! no longer running. A bound on the whole wait is optional; without one the
//! poll can block for as long as the container keeps running.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::container::{Container, ContainerRuntime, ContainerStatus, RuntimeError};
use crate::eventually::{eventually, ConditionError};
use crate::wait::WaitError;

/// Error type for the output wait
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("{0}")]
    Timeout(#[from] WaitError),

    #[error("Failed to check {path}: {source}")]
    Inspect {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Why the wait stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputOutcome {
    /// The output file exists
    Written { attempts: u32 },
    /// The container left the running state before the file appeared
    ContainerStopped { status: ContainerStatus },
}

/// Polls for the agent's output file
#[derive(Debug, Clone)]
pub struct OutputWatcher {
    path: PathBuf,
    interval: Duration,
    timeout: Option<Duration>,
}

impl OutputWatcher {
    /// Poll `path` every second, without a bound
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interval: Duration::from_secs(1),
            timeout: None,
        }
    }

    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The file being waited for
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until the file exists or the container stops running
    pub async fn wait_for_container(
        &self,
        runtime: &dyn ContainerRuntime,
        container: &Container,
    ) -> Result<OutputOutcome, OutputError> {
        let path = self.path.as_path();

        debug!(path = %path.display(), timeout = ?self.timeout, "Waiting for output file");

        let settled = eventually(move || async move { check(path, runtime, container).await })
            .bound(self.timeout)
            .interval(self.interval)
            .await_condition()
            .await;

        match settled {
            Ok(settled) => {
                let outcome = match settled.value? {
                    Stop::Written => OutputOutcome::Written {
                        attempts: settled.attempts,
                    },
                    Stop::ContainerStopped(status) => OutputOutcome::ContainerStopped { status },
                };
                info!(path = %path.display(), elapsed = ?settled.elapsed, ?outcome, "Stopped waiting for output");
                Ok(outcome)
            }
            Err(ConditionError::TimedOut {
                elapsed, timeout, ..
            }) => {
                let state = match runtime.status(container).await {
                    Ok(status) => format!("file absent, container {status}"),
                    Err(e) => format!("file absent, container status unknown: {e}"),
                };

                Err(WaitError::new(format!("file {}", path.display()), timeout, elapsed)
                    .with_state(state)
                    .into())
            }
        }
    }
}

enum Stop {
    Written,
    ContainerStopped(ContainerStatus),
}

async fn check(
    path: &Path,
    runtime: &dyn ContainerRuntime,
    container: &Container,
) -> Option<Result<Stop, OutputError>> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => return Some(Ok(Stop::Written)),
        Ok(false) => {}
        Err(source) => {
            return Some(Err(OutputError::Inspect {
                path: path.display().to_string(),
                source,
            }))
        }
    }

    match runtime.status(container).await {
        Ok(status) if status.is_running() => None,
        Ok(status) => Some(Ok(Stop::ContainerStopped(status))),
        Err(e) => Some(Err(e.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Reports `running` for the first `running_checks` status calls
    struct CountdownRuntime {
        running_checks: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ContainerRuntime for CountdownRuntime {
        async fn run(&self, image: &str, _mounts: &[crate::container::Mount]) -> Result<Container, RuntimeError> {
            Ok(Container {
                id: "c0".to_string(),
                image: image.to_string(),
            })
        }

        async fn status(&self, _container: &Container) -> Result<ContainerStatus, RuntimeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(if n < self.running_checks {
                ContainerStatus::Running
            } else {
                ContainerStatus::Exited
            })
        }

        async fn logs(&self, _container: &Container) -> Result<String, RuntimeError> {
            Ok(String::new())
        }

        async fn stop(&self, _container: &Container) -> Result<(), RuntimeError> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "countdown"
        }
    }

    fn container() -> Container {
        Container {
            id: "c0".to_string(),
            image: "gfd:test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_existing_file_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gfd");
        std::fs::write(&path, "a=1\n").unwrap();

        let runtime = CountdownRuntime {
            running_checks: u32::MAX,
            calls: AtomicU32::new(0),
        };

        let outcome = OutputWatcher::new(&path)
            .interval(Duration::from_secs(3600))
            .wait_for_container(&runtime, &container())
            .await
            .unwrap();

        assert_eq!(outcome, OutputOutcome::Written { attempts: 1 });
        assert_eq!(runtime.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_file_appears_later() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gfd");
        let runtime = CountdownRuntime {
            running_checks: u32::MAX,
            calls: AtomicU32::new(0),
        };

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tokio::fs::write(&writer_path, "a=1\n").await.unwrap();
        });

        let outcome = OutputWatcher::new(&path)
            .interval(Duration::from_millis(10))
            .timeout(Some(Duration::from_secs(5)))
            .wait_for_container(&runtime, &container())
            .await
            .unwrap();

        writer.await.unwrap();
        assert!(matches!(outcome, OutputOutcome::Written { attempts } if attempts > 1));
        assert!(runtime.calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_unreadable_mount_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("mount");
        std::fs::write(&not_a_dir, "").unwrap();
        let runtime = CountdownRuntime {
            running_checks: u32::MAX,
            calls: AtomicU32::new(0),
        };

        let err = OutputWatcher::new(not_a_dir.join("gfd"))
            .interval(Duration::from_millis(10))
            .timeout(Some(Duration::from_secs(5)))
            .wait_for_container(&runtime, &container())
            .await
            .unwrap_err();

        match err {
            OutputError::Inspect { path, .. } => assert!(path.ends_with("mount/gfd")),
            other => panic!("expected Inspect, got {other:?}"),
        }
        assert_eq!(runtime.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_container_exits() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = CountdownRuntime {
            running_checks: 3,
            calls: AtomicU32::new(0),
        };

        let outcome = OutputWatcher::new(dir.path().join("gfd"))
            .wait_for_container(&runtime, &container())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            OutputOutcome::ContainerStopped {
                status: ContainerStatus::Exited
            }
        );
        assert_eq!(runtime.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_last_state() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = CountdownRuntime {
            running_checks: u32::MAX,
            calls: AtomicU32::new(0),
        };

        let err = OutputWatcher::new(dir.path().join("gfd"))
            .timeout(Some(Duration::from_secs(10)))
            .wait_for_container(&runtime, &container())
            .await
            .unwrap_err();

        match err {
            OutputError::Timeout(wait) => {
                assert!(wait.resource.ends_with("gfd"));
                assert_eq!(wait.last_state, "file absent, container running");
                assert_eq!(wait.timeout, Duration::from_secs(10));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }
}
