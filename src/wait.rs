//! Rich wait errors with debugging context
//!
//! Provides detailed error information when a bounded wait gives up.
//!
//! # Example
//!
//! ```ignore
//! match watcher.wait_for_container(&runtime, &container).await {
//!     Err(OutputError::Timeout(err)) => {
//!         println!("Waited for: {}", err.resource);
//!         println!("Last state: {}", err.last_state);
//!         println!("Elapsed: {:?}", err.elapsed);
//!     }
//!     _ => {}
//! }
//! ```

use std::fmt;
use std::time::Duration;

use k8s_openapi::api::core::v1::Node;

/// Rich error context for wait operations
#[derive(Debug, Clone)]
pub struct WaitError {
    /// What was being waited for (e.g., "file /tmp/x/gfd")
    pub resource: String,
    /// Description of the last observed state
    pub last_state: String,
    /// How long we waited before giving up
    pub elapsed: Duration,
    /// The timeout that was configured
    pub timeout: Duration,
}

impl WaitError {
    /// Create a new WaitError
    pub fn new(resource: impl Into<String>, timeout: Duration, elapsed: Duration) -> Self {
        Self {
            resource: resource.into(),
            last_state: "unknown".to_string(),
            elapsed,
            timeout,
        }
    }

    /// Set the last observed state
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.last_state = state.into();
        self
    }
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Wait timeout for {}", self.resource)?;
        writeln!(f, "├─ Last state: {}", self.last_state)?;
        writeln!(f, "├─ Elapsed: {:?}", self.elapsed)?;
        write!(f, "└─ Timeout: {:?}", self.timeout)
    }
}

impl std::error::Error for WaitError {}

/// Helper trait for describing what a watched object currently looks like
pub trait ResourceState {
    /// Get a human-readable description of the current state
    fn state_description(&self) -> String;
}

impl ResourceState for Node {
    fn state_description(&self) -> String {
        let name = self.metadata.name.as_deref().unwrap_or("<unnamed>");
        let labels = self.metadata.labels.as_ref().map_or(0, |l| l.len());

        let ready = self
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"))
            .map_or("Unknown", |c| c.status.as_str());

        format!("node/{name}: Ready={ready}, {labels} labels")
    }
}
