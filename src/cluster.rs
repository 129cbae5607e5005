//! Kubernetes control-plane access
//!
//! The verification flows never reach for a process-wide client. They take a
//! [`ControlPlane`], which [`KubeControlPlane`] implements against a live API
//! server and tests implement in memory.
//!
//! # Example
//!
//! ```no_run
//! use gfd_verify::cluster::{ControlPlane, KubeControlPlane};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cluster = KubeControlPlane::connect(None, None).await?;
//!     for node in cluster.list_nodes().await? {
//!         println!("{:?}", node.metadata.name);
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Node, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::api::{Api, ListParams, PostParams, WatchEvent, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::config::E2eConfig;

/// API servers reject watch timeouts of 295s and above
const MAX_SERVER_WATCH_SECS: u64 = 290;

/// Error type for control-plane operations
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("Failed to create Kubernetes client: {0}")]
    Client(String),

    #[error("Failed to create resource: {0}")]
    Create(String),

    #[error("Failed to list resources: {0}")]
    List(String),

    #[error("Watch error: {0}")]
    Watch(String),
}

/// A change to a node, as delivered by a watch
#[derive(Debug, Clone)]
pub enum NodeEvent {
    Added(Node),
    Modified(Node),
    Deleted(Node),
}

impl NodeEvent {
    /// The node the event is about
    #[must_use]
    pub fn node(&self) -> &Node {
        match self {
            Self::Added(node) | Self::Modified(node) | Self::Deleted(node) => node,
        }
    }
}

/// Stream of node watch events
pub type NodeEventStream<'a> = BoxStream<'a, Result<NodeEvent, ClusterError>>;

/// The control-plane operations the verification flows need
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Create a `DaemonSet` in a namespace
    async fn create_daemon_set(
        &self,
        namespace: &str,
        daemon_set: &DaemonSet,
    ) -> Result<(), ClusterError>;

    /// Create a `ServiceAccount` in a namespace
    async fn create_service_account(
        &self,
        namespace: &str,
        account: &ServiceAccount,
    ) -> Result<(), ClusterError>;

    /// Create a `ClusterRole`
    async fn create_cluster_role(&self, role: &ClusterRole) -> Result<(), ClusterError>;

    /// Create a `ClusterRoleBinding`
    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> Result<(), ClusterError>;

    /// List all nodes
    async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError>;

    /// Watch nodes; the stream ends on its own once `timeout` has passed
    async fn watch_nodes<'a>(&'a self, timeout: Duration)
        -> Result<NodeEventStream<'a>, ClusterError>;

    /// Longest window a single watch covers, when the server caps it
    fn max_watch_window(&self) -> Option<Duration> {
        None
    }
}

/// [`ControlPlane`] backed by a live API server
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
    nodes: Api<Node>,
}

impl KubeControlPlane {
    /// Wrap an existing client
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            nodes: Api::all(client.clone()),
            client,
        }
    }

    /// Connect with the client selection of an end-to-end config
    pub async fn from_config(config: &E2eConfig) -> Result<Self, ClusterError> {
        Self::connect(config.kubeconfig.as_deref(), config.context.as_deref()).await
    }

    /// Connect using an explicit kubeconfig and/or context
    ///
    /// With neither set, the config is inferred: `KUBECONFIG`,
    /// `~/.kube/config`, then the in-cluster service account.
    pub async fn connect(
        kubeconfig: Option<&Path>,
        context: Option<&str>,
    ) -> Result<Self, ClusterError> {
        let options = KubeConfigOptions {
            context: context.map(String::from),
            ..Default::default()
        };

        let config = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    ClusterError::Client(format!("cannot read {}: {e}", path.display()))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| ClusterError::Client(e.to_string()))?
            }
            None if context.is_some() => Config::from_kubeconfig(&options)
                .await
                .map_err(|e| ClusterError::Client(e.to_string()))?,
            None => Config::infer()
                .await
                .map_err(|e| ClusterError::Client(e.to_string()))?,
        };

        debug!(cluster_url = %config.cluster_url, "Connecting to Kubernetes API");

        let client = Client::try_from(config).map_err(|e| ClusterError::Client(e.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    #[instrument(skip(self, daemon_set), fields(name = ?daemon_set.metadata.name))]
    async fn create_daemon_set(
        &self,
        namespace: &str,
        daemon_set: &DaemonSet,
    ) -> Result<(), ClusterError> {
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        let name = daemon_set.metadata.name.as_deref().unwrap_or("<unnamed>");

        api.create(&PostParams::default(), daemon_set)
            .await
            .map_err(|e| ClusterError::Create(improve_error_message(&e, "DaemonSet", name)))?;

        info!(namespace = %namespace, name = %name, "Created DaemonSet");
        Ok(())
    }

    #[instrument(skip(self, account), fields(name = ?account.metadata.name))]
    async fn create_service_account(
        &self,
        namespace: &str,
        account: &ServiceAccount,
    ) -> Result<(), ClusterError> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let name = account.metadata.name.as_deref().unwrap_or("<unnamed>");

        api.create(&PostParams::default(), account)
            .await
            .map_err(|e| ClusterError::Create(improve_error_message(&e, "ServiceAccount", name)))?;

        info!(namespace = %namespace, name = %name, "Created ServiceAccount");
        Ok(())
    }

    #[instrument(skip(self, role), fields(name = ?role.metadata.name))]
    async fn create_cluster_role(&self, role: &ClusterRole) -> Result<(), ClusterError> {
        let api: Api<ClusterRole> = Api::all(self.client.clone());
        let name = role.metadata.name.as_deref().unwrap_or("<unnamed>");

        api.create(&PostParams::default(), role)
            .await
            .map_err(|e| ClusterError::Create(improve_error_message(&e, "ClusterRole", name)))?;

        info!(name = %name, "Created ClusterRole");
        Ok(())
    }

    #[instrument(skip(self, binding), fields(name = ?binding.metadata.name))]
    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> Result<(), ClusterError> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        let name = binding.metadata.name.as_deref().unwrap_or("<unnamed>");

        api.create(&PostParams::default(), binding)
            .await
            .map_err(|e| {
                ClusterError::Create(improve_error_message(&e, "ClusterRoleBinding", name))
            })?;

        info!(name = %name, "Created ClusterRoleBinding");
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError> {
        let list = self
            .nodes
            .list(&ListParams::default())
            .await
            .map_err(|e| ClusterError::List(format!("failed to list nodes: {e}")))?;

        Ok(list.items)
    }

    async fn watch_nodes<'a>(
        &'a self,
        timeout: Duration,
    ) -> Result<NodeEventStream<'a>, ClusterError> {
        let secs = timeout.as_secs().clamp(1, MAX_SERVER_WATCH_SECS);
        #[allow(clippy::cast_possible_truncation)]
        let params = WatchParams::default().timeout(secs as u32);

        debug!(timeout_secs = secs, "Starting node watch");

        let stream = self
            .nodes
            .watch(&params, "0")
            .await
            .map_err(|e| ClusterError::Watch(e.to_string()))?;

        let events = stream.filter_map(|event| async move {
            match event {
                Ok(WatchEvent::Added(node)) => Some(Ok(NodeEvent::Added(node))),
                Ok(WatchEvent::Modified(node)) => Some(Ok(NodeEvent::Modified(node))),
                Ok(WatchEvent::Deleted(node)) => Some(Ok(NodeEvent::Deleted(node))),
                Ok(WatchEvent::Bookmark(_)) => None,
                Ok(WatchEvent::Error(status)) => Some(Err(ClusterError::Watch(format!(
                    "{}: {}",
                    status.reason, status.message
                )))),
                Err(e) => Some(Err(ClusterError::Watch(e.to_string()))),
            }
        });

        Ok(events.boxed())
    }

    fn max_watch_window(&self) -> Option<Duration> {
        Some(Duration::from_secs(MAX_SERVER_WATCH_SECS))
    }
}

/// Turn a kube error into a message naming the resource involved
pub(crate) fn improve_error_message(
    err: &kube::Error,
    resource_kind: &str,
    resource_name: &str,
) -> String {
    if let kube::Error::Api(status) = err {
        match status.code {
            404 => return format!("{resource_kind} '{resource_name}' not found"),
            409 => return format!("{resource_kind} '{resource_name}' already exists"),
            403 => {
                return format!("{resource_kind} '{resource_name}': permission denied (check RBAC)")
            }
            422 => {
                return format!(
                    "{resource_kind} '{resource_name}' rejected as invalid: {}",
                    status.message
                )
            }
            _ => {}
        }
    }

    let raw = err.to_string();

    if raw.contains("connection refused") || raw.contains("ECONNREFUSED") {
        return format!("{resource_kind} '{resource_name}': cannot connect to Kubernetes API");
    }

    if raw.contains("timeout") || raw.contains("deadline exceeded") {
        return format!("{resource_kind} '{resource_name}': operation timed out");
    }

    format!("{resource_kind} '{resource_name}': {raw}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("daemonsets.apps \"gfd\" {reason}"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn test_improve_error_already_exists() {
        let msg = improve_error_message(&api_error(409, "AlreadyExists"), "DaemonSet", "gfd");
        assert_eq!(msg, "DaemonSet 'gfd' already exists");
    }

    #[test]
    fn test_improve_error_forbidden() {
        let msg = improve_error_message(&api_error(403, "Forbidden"), "ClusterRole", "gfd");
        assert!(msg.contains("permission denied"));
        assert!(msg.contains("ClusterRole 'gfd'"));
    }

    #[test]
    fn test_improve_error_not_found() {
        let msg = improve_error_message(&api_error(404, "NotFound"), "ServiceAccount", "sa");
        assert_eq!(msg, "ServiceAccount 'sa' not found");
    }

    #[test]
    fn test_improve_error_invalid() {
        let msg = improve_error_message(&api_error(422, "Invalid"), "DaemonSet", "gfd");
        assert!(msg.contains("rejected as invalid"));
    }

    #[test]
    fn test_improve_error_other_code_keeps_context() {
        let msg = improve_error_message(&api_error(500, "InternalError"), "DaemonSet", "gfd");
        assert!(msg.starts_with("DaemonSet 'gfd': "));
    }

    #[test]
    fn test_node_event_accessor() {
        let node = Node {
            metadata: kube::api::ObjectMeta {
                name: Some("gpu-0".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let event = NodeEvent::Modified(node);
        assert_eq!(event.node().metadata.name.as_deref(), Some("gpu-0"));
    }

    #[tokio::test]
    async fn test_from_config_reads_configured_kubeconfig() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent-kubeconfig");
        let config = E2eConfig::new("gfd.yaml", "nfd.yaml")
            .kubeconfig(&missing)
            .context("gpu-lab");

        let err = KubeControlPlane::from_config(&config).await.err().unwrap();

        match err {
            ClusterError::Client(msg) => assert!(msg.contains("absent-kubeconfig"), "{msg}"),
            other => panic!("expected Client error, got {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore] // Requires real cluster
    async fn test_list_nodes_live() {
        let cluster = KubeControlPlane::connect(None, None)
            .await
            .expect("Should connect to cluster");
        let nodes = cluster.list_nodes().await.expect("Should list nodes");
        assert!(!nodes.is_empty(), "Cluster should have at least one node");
    }
}
