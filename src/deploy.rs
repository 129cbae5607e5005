//! Manifest deployment
//!
//! Replays a manifest stream against the control plane, one create call per
//! document, in stream order. Nothing is rolled back if a create fails;
//! cleaning up a half-deployed cluster is left to whoever owns it.

use tracing::{debug, instrument};

use crate::cluster::{ClusterError, ControlPlane};
use crate::manifest::{Document, Manifest};

/// Error type for deployment
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Resources created by one deployment, as `Kind/name`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeployResult {
    pub created: Vec<String>,
}

/// Applies manifests through an injected control plane
pub struct Deployer<'a> {
    cluster: &'a dyn ControlPlane,
}

impl<'a> Deployer<'a> {
    #[must_use]
    pub fn new(cluster: &'a dyn ControlPlane) -> Self {
        Self { cluster }
    }

    /// Apply parsed documents in order
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub async fn deploy(&self, documents: &[Document]) -> Result<DeployResult, DeployError> {
        let mut result = DeployResult::default();

        for document in documents {
            debug!(kind = document.manifest.kind(), namespace = %document.namespace, "Applying document");
            self.apply(document).await?;
            result.created.push(format!(
                "{}/{}",
                document.manifest.kind(),
                document.manifest.name().unwrap_or("<unnamed>")
            ));
        }

        Ok(result)
    }

    /// Dispatch one document to the create call for its kind
    pub async fn apply(&self, document: &Document) -> Result<(), DeployError> {
        let namespace = document.namespace.as_str();

        match &document.manifest {
            Manifest::DaemonSet(ds) => self.cluster.create_daemon_set(namespace, ds).await?,
            Manifest::ServiceAccount(sa) => {
                self.cluster.create_service_account(namespace, sa).await?;
            }
            Manifest::ClusterRole(role) => self.cluster.create_cluster_role(role).await?,
            Manifest::ClusterRoleBinding(binding) => {
                self.cluster.create_cluster_role_binding(binding).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest;
    use crate::cluster::NodeEventStream;
    use async_trait::async_trait;
    use futures::StreamExt;
    use k8s_openapi::api::apps::v1::DaemonSet;
    use k8s_openapi::api::core::v1::{Node, ServiceAccount};
    use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records create calls as `op:namespace:name`
    #[derive(Default)]
    struct RecordingCluster {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingCluster {
        fn record(&self, op: &str, ns: &str, name: Option<&String>) -> Result<(), ClusterError> {
            let name = name.map(String::as_str).unwrap_or("");
            if self.fail_on == Some(op) {
                return Err(ClusterError::Create(format!("{op} '{name}' already exists")));
            }
            self.calls.lock().unwrap().push(format!("{op}:{ns}:{name}"));
            Ok(())
        }
    }

    #[async_trait]
    impl ControlPlane for RecordingCluster {
        async fn create_daemon_set(&self, ns: &str, ds: &DaemonSet) -> Result<(), ClusterError> {
            self.record("daemonset", ns, ds.metadata.name.as_ref())
        }

        async fn create_service_account(
            &self,
            ns: &str,
            sa: &ServiceAccount,
        ) -> Result<(), ClusterError> {
            self.record("serviceaccount", ns, sa.metadata.name.as_ref())
        }

        async fn create_cluster_role(&self, role: &ClusterRole) -> Result<(), ClusterError> {
            self.record("clusterrole", "", role.metadata.name.as_ref())
        }

        async fn create_cluster_role_binding(
            &self,
            binding: &ClusterRoleBinding,
        ) -> Result<(), ClusterError> {
            self.record("clusterrolebinding", "", binding.metadata.name.as_ref())
        }

        async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError> {
            Ok(Vec::new())
        }

        async fn watch_nodes<'a>(
            &'a self,
            _timeout: Duration,
        ) -> Result<NodeEventStream<'a>, ClusterError> {
            Ok(futures::stream::empty().boxed())
        }
    }

    const NFD_YAML: &str = "\
apiVersion: v1
kind: ServiceAccount
metadata:
  name: nfd-master
  namespace: node-feature-discovery
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: nfd-master
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: nfd-master
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: nfd-master
---
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: nfd
spec:
  selector:
    matchLabels:
      app: nfd
  template:
    spec:
      containers:
      - name: nfd
        image: nfd:test
";

    #[tokio::test]
    async fn test_dispatch_by_kind_in_order() {
        let cluster = RecordingCluster::default();
        let documents = manifest::parse_stream(NFD_YAML).unwrap();

        let result = Deployer::new(&cluster).deploy(&documents).await.unwrap();

        assert_eq!(
            *cluster.calls.lock().unwrap(),
            vec![
                "serviceaccount:node-feature-discovery:nfd-master",
                "clusterrole::nfd-master",
                "clusterrolebinding::nfd-master",
                "daemonset:default:nfd",
            ]
        );
        assert_eq!(result.created[3], "DaemonSet/nfd");
    }

    #[tokio::test]
    async fn test_create_failure_stops_without_rollback() {
        let cluster = RecordingCluster {
            fail_on: Some("clusterrolebinding"),
            ..Default::default()
        };
        let documents = manifest::parse_stream(NFD_YAML).unwrap();

        let err = Deployer::new(&cluster).deploy(&documents).await.unwrap_err();

        assert!(matches!(err, DeployError::Cluster(_)));
        assert_eq!(cluster.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_stream_is_noop() {
        let cluster = RecordingCluster::default();
        let result = Deployer::new(&cluster).deploy(&[]).await.unwrap();

        assert!(result.created.is_empty());
        assert!(cluster.calls.lock().unwrap().is_empty());
    }
}
