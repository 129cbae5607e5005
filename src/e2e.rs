//! Kubernetes end-to-end flow
//!
//! 1. Read and validate both manifest streams.
//! 2. List nodes and pick the node under test.
//! 3. Expect the GFD patterns plus every label the node already carries,
//!    except labels from other NFD sources.
//! 4. Deploy the GFD manifest, then the NFD manifest.
//! 5. Watch nodes until GFD writes its timestamp label (or the bound passes).
//! 6. Re-read the node and reconcile its labels, discarding other NFD sources.

use k8s_openapi::api::core::v1::Node;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use crate::cluster::{ClusterError, ControlPlane};
use crate::config::E2eConfig;
use crate::deploy::{DeployError, Deployer};
use crate::labels::{self, ExpectedLabel, LabelsError};
use crate::manifest::{self, Document, ManifestError};
use crate::reconcile::{Reconciler, Reconciliation};
use crate::watch::{SentinelOutcome, SentinelWatch};

/// Error type for the end-to-end flow
#[derive(Debug, thiserror::Error)]
pub enum E2eError {
    #[error("No nodes found")]
    NoNodes,

    #[error("Node {0} not found")]
    NodeNotFound(String),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Labels(#[from] LabelsError),
}

/// Both manifest streams, parsed and validated
#[derive(Debug, Clone)]
pub struct Manifests {
    pub gfd: Vec<Document>,
    pub nfd: Vec<Document>,
}

impl Manifests {
    /// Read both streams named in the config
    ///
    /// An unknown kind in either file fails here, before any cluster call.
    pub async fn load(config: &E2eConfig) -> Result<Self, ManifestError> {
        Ok(Self {
            gfd: manifest::read_stream(&config.gfd_manifest).await?,
            nfd: manifest::read_stream(&config.nfd_manifest).await?,
        })
    }
}

/// What one end-to-end run observed
#[derive(Debug, Clone)]
pub struct E2eReport {
    /// The node whose labels were checked
    pub node: String,
    /// How the node watch ended
    pub sentinel: SentinelOutcome,
    /// The final label check
    pub reconciliation: Reconciliation,
}

impl E2eReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.reconciliation.passed()
    }
}

/// Load the manifests named in the config and run the flow
pub async fn run(cluster: &dyn ControlPlane, config: &E2eConfig) -> Result<E2eReport, E2eError> {
    let manifests = Manifests::load(config).await?;
    run_with(cluster, config, &manifests).await
}

/// Run the end-to-end flow with already loaded manifests
#[instrument(skip_all, fields(gfd = %config.gfd_manifest.display(), nfd = %config.nfd_manifest.display()))]
pub async fn run_with(
    cluster: &dyn ControlPlane,
    config: &E2eConfig,
    manifests: &Manifests,
) -> Result<E2eReport, E2eError> {
    let nodes = cluster.list_nodes().await?;
    let target = select_node(&nodes, config.node.as_deref())?;
    let node = node_name(target);
    info!(node = %node, nodes = nodes.len(), "Selected node");

    let expected = expected_labels(config, target)?;

    info!("Deploy NFD and GFD");
    let deployer = Deployer::new(cluster);
    for (path, documents) in [
        (&config.gfd_manifest, &manifests.gfd),
        (&config.nfd_manifest, &manifests.nfd),
    ] {
        let result = deployer.deploy(documents).await?;
        info!(manifest = %path.display(), created = ?result.created, "Manifest applied");
    }

    info!("Watching node updates");
    let sentinel = SentinelWatch::new(&config.sentinel_label)
        .node(Some(node.clone()))
        .timeout(config.watch_timeout)
        .run(cluster)
        .await?;
    if !matches!(sentinel, SentinelOutcome::Found { .. }) {
        warn!(?sentinel, "Checking labels without the sentinel label");
    }

    info!("Checking labels");
    let nodes = cluster.list_nodes().await?;
    let target = select_node(&nodes, Some(&node))?;
    let observed = labels::from_map(node_labels(target));

    let reconciliation = Reconciler::new()
        .strategy(config.strategy)
        .noise_filter(config.noise_filter.clone())
        .reconcile(&expected, &observed);

    Ok(E2eReport {
        node,
        sentinel,
        reconciliation,
    })
}

/// The named node, or the first listed one
pub fn select_node<'a>(nodes: &'a [Node], name: Option<&str>) -> Result<&'a Node, E2eError> {
    match name {
        Some(name) => nodes
            .iter()
            .find(|n| n.metadata.name.as_deref() == Some(name))
            .ok_or_else(|| E2eError::NodeNotFound(name.to_string())),
        None => nodes.first().ok_or(E2eError::NoNodes),
    }
}

/// Configured patterns followed by a literal for each label already on the node
///
/// Labels the noise filter discards from the final observation are left out;
/// nothing could ever match them.
fn expected_labels(config: &E2eConfig, node: &Node) -> Result<Vec<ExpectedLabel>, LabelsError> {
    let mut expected = labels::compile_all(&config.expected_patterns)?;

    for (key, value) in node_labels(node) {
        if config.noise_filter.is_noise(&labels::render(key, value)) {
            continue;
        }
        expected.push(ExpectedLabel::literal(key, value)?);
    }

    Ok(expected)
}

fn node_name(node: &Node) -> String {
    node.metadata.name.clone().unwrap_or_default()
}

fn node_labels(node: &Node) -> &BTreeMap<String, String> {
    static EMPTY: BTreeMap<String, String> = BTreeMap::new();
    node.metadata.labels.as_ref().unwrap_or(&EMPTY)
}
