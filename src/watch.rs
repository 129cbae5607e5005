//! Node watch until the agent signals completion
//!
//! GFD writes its timestamp label last, so once a node modification carries
//! that sentinel label, the labeling pass is over. The watch is bounded, but
//! running out of time is not a failure by itself: the caller goes on to
//! check whatever labels the node has by then.
//!
//! # Example
//!
//! ```ignore
//! use gfd_verify::watch::{SentinelOutcome, SentinelWatch};
//! use std::time::Duration;
//!
//! let outcome = SentinelWatch::new("feature.node.kubernetes.io/gfd-nvidia-timestamp")
//!     .timeout(Duration::from_secs(180))
//!     .run(&cluster)
//!     .await?;
//!
//! if outcome != SentinelOutcome::TimedOut { /* ... */ }
//! ```

use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cluster::{ClusterError, ControlPlane, NodeEvent};
use crate::wait::ResourceState;

/// How a sentinel watch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentinelOutcome {
    /// A modified node carried the sentinel label
    Found { node: String },
    /// The server closed the stream first
    StreamEnded,
    /// The bound elapsed first
    TimedOut,
}

/// Watches node events for a sentinel label
#[derive(Debug, Clone)]
pub struct SentinelWatch {
    sentinel: String,
    node: Option<String>,
    timeout: Duration,
}

impl SentinelWatch {
    /// Watch for `sentinel` on any node, for up to 180 seconds
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into(),
            node: None,
            timeout: Duration::from_secs(180),
        }
    }

    /// Only accept the sentinel on this node
    #[must_use]
    pub fn node(mut self, name: Option<String>) -> Self {
        self.node = name;
        self
    }

    /// Set the watch bound
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Watch nodes on the control plane until the sentinel, stream end, or timeout
    ///
    /// When the server caps a watch below the remaining time, a stream that
    /// ends at the cap is reopened until the overall bound passes.
    pub async fn run(&self, cluster: &dyn ControlPlane) -> Result<SentinelOutcome, ClusterError> {
        let deadline = Instant::now() + self.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let window = cluster
                .max_watch_window()
                .map_or(remaining, |max| remaining.min(max));

            let events = cluster.watch_nodes(window).await?;
            let outcome = self.wait_until(events, deadline).await?;

            if outcome == SentinelOutcome::StreamEnded && window < remaining {
                debug!(window = ?window, "Watch window closed before the bound, reopening");
                continue;
            }
            return Ok(outcome);
        }
    }

    /// Consume events until the sentinel shows up, the stream ends, or `deadline` passes
    async fn wait_until<S>(&self, mut events: S, deadline: Instant) -> Result<SentinelOutcome, ClusterError>
    where
        S: Stream<Item = Result<NodeEvent, ClusterError>> + Unpin,
    {
        let start = Instant::now();

        loop {
            let next = match tokio::time::timeout_at(deadline, events.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(
                        sentinel = %self.sentinel,
                        timeout = ?self.timeout,
                        "Sentinel label not seen before watch bound, checking labels anyway"
                    );
                    return Ok(SentinelOutcome::TimedOut);
                }
            };

            let event = match next {
                Some(event) => event?,
                None => {
                    debug!(elapsed = ?start.elapsed(), "Node watch stream ended");
                    return Ok(SentinelOutcome::StreamEnded);
                }
            };

            if let NodeEvent::Modified(_) = &event {
                info!(state = %event.node().state_description(), "Node modified");
            }

            if let Some(name) = self.sentinel_node(&event) {
                info!(node = %name, elapsed = ?start.elapsed(), "Sentinel label found, stop watching node");
                return Ok(SentinelOutcome::Found { node: name });
            }
        }
    }

    /// Name of the node if this event is a modification carrying the sentinel
    fn sentinel_node(&self, event: &NodeEvent) -> Option<String> {
        let NodeEvent::Modified(node) = event else {
            return None;
        };

        let name = node.metadata.name.clone().unwrap_or_default();
        if self.node.as_ref().is_some_and(|target| *target != name) {
            return None;
        }

        node.metadata
            .labels
            .as_ref()
            .is_some_and(|labels| labels.contains_key(&self.sentinel))
            .then_some(name)
    }
}
