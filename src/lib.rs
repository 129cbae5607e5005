//! gfd-verify - verification flows for GPU Feature Discovery
//!
//! Checks that GFD produces exactly the labels it should, in two settings:
//!
//! - **End-to-end** ([`e2e`]): deploy GFD and NFD into a cluster, wait for
//!   GFD's timestamp label on a node, then reconcile the node's labels.
//! - **Integration** ([`integration`]): run the GFD image once in a container,
//!   wait for its output file, then reconcile the file's lines.
//!
//! Both flows take their external systems as parameters ([`ControlPlane`],
//! [`ContainerRuntime`]), so they run just as well against in-memory fakes.
//!
//! # Example
//!
//! ```no_run
//! use gfd_verify::{e2e, E2eConfig, KubeControlPlane, LabelSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cluster = KubeControlPlane::connect(None, None).await?;
//!     let config = E2eConfig::new("gfd.yaml", "nfd.yaml");
//!
//!     let report = e2e::run(&cluster, &config).await?;
//!     for line in report.reconciliation.report_lines(LabelSource::Node) {
//!         eprintln!("{line}");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cluster;
pub mod config;
pub mod container;
pub mod deploy;
pub mod e2e;
pub mod eventually;
pub mod integration;
pub mod labels;
pub mod manifest;
pub mod output;
pub mod reconcile;
pub mod telemetry;
pub mod wait;
pub mod watch;

// Re-export commonly used types
pub use cluster::{ClusterError, ControlPlane, KubeControlPlane, NodeEvent, NodeEventStream};
pub use config::{E2eConfig, IntegrationConfig};
pub use container::{Container, ContainerRuntime, ContainerStatus, DockerCli, Mount, RuntimeError};
pub use deploy::{DeployError, DeployResult, Deployer};
pub use e2e::{E2eError, E2eReport, Manifests};
pub use eventually::{eventually, ConditionError, Settled};
pub use integration::{IntegrationError, IntegrationReport};
pub use labels::{ExpectedLabel, LabelsError};
pub use manifest::{Document, Manifest, ManifestError};
pub use output::{OutputError, OutputOutcome, OutputWatcher};
pub use reconcile::{LabelSource, MatchStrategy, NoiseFilter, Reconciler, Reconciliation};
pub use telemetry::init_logging;
pub use wait::{ResourceState, WaitError};
pub use watch::{SentinelOutcome, SentinelWatch};
