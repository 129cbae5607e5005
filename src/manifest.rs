//! Multi-document manifest parsing
//!
//! Splits a YAML stream into typed Kubernetes objects, keyed by `kind`.
//! Only the kinds GFD and NFD deployments are made of are accepted:
//! `DaemonSet`, `ServiceAccount`, `ClusterRole` and `ClusterRoleBinding`.
//! Anything else means the test setup itself is broken.

use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use serde::Deserialize;
use serde_yaml::Value;
use std::path::Path;

/// Namespace used when a document does not name one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Error type for manifest parsing
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in document {index}: {source}")]
    Yaml {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Document {index} has no kind")]
    MissingKind { index: usize },

    #[error("Unknown kind {0}")]
    UnknownKind(String),

    #[error("Invalid {kind} in document {index}: {source}")]
    Invalid {
        kind: &'static str,
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A typed manifest of one of the supported kinds
#[derive(Debug, Clone)]
pub enum Manifest {
    DaemonSet(Box<DaemonSet>),
    ServiceAccount(ServiceAccount),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
}

impl Manifest {
    /// Kubernetes kind name
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DaemonSet(_) => "DaemonSet",
            Self::ServiceAccount(_) => "ServiceAccount",
            Self::ClusterRole(_) => "ClusterRole",
            Self::ClusterRoleBinding(_) => "ClusterRoleBinding",
        }
    }

    /// `metadata.name`, if set
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        let meta = match self {
            Self::DaemonSet(ds) => &ds.metadata,
            Self::ServiceAccount(sa) => &sa.metadata,
            Self::ClusterRole(role) => &role.metadata,
            Self::ClusterRoleBinding(binding) => &binding.metadata,
        };
        meta.name.as_deref()
    }
}

/// One document from a manifest stream
#[derive(Debug, Clone)]
pub struct Document {
    /// `metadata.namespace`, or [`DEFAULT_NAMESPACE`]
    pub namespace: String,
    /// The typed object
    pub manifest: Manifest,
}

/// Read and parse a manifest file
pub async fn read_stream(path: &Path) -> Result<Vec<Document>, ManifestError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ManifestError::Read {
            path: path.display().to_string(),
            source,
        })?;
    parse_stream(&text)
}

/// Parse every document of a YAML stream
///
/// Empty documents are skipped. The whole stream is validated before
/// anything is returned, so an unknown kind anywhere yields no documents.
pub fn parse_stream(text: &str) -> Result<Vec<Document>, ManifestError> {
    let mut documents = Vec::new();

    for (index, doc) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value =
            Value::deserialize(doc).map_err(|source| ManifestError::Yaml { index, source })?;

        if value.is_null() {
            continue;
        }

        documents.push(parse_document(index, value)?);
    }

    Ok(documents)
}

fn parse_document(index: usize, value: Value) -> Result<Document, ManifestError> {
    let kind = value
        .get("kind")
        .and_then(Value::as_str)
        .ok_or(ManifestError::MissingKind { index })?
        .to_string();

    let namespace = value
        .get("metadata")
        .and_then(|meta| meta.get("namespace"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_NAMESPACE)
        .to_string();

    let manifest = match kind.as_str() {
        "DaemonSet" => Manifest::DaemonSet(Box::new(typed(index, "DaemonSet", value)?)),
        "ServiceAccount" => Manifest::ServiceAccount(typed(index, "ServiceAccount", value)?),
        "ClusterRole" => Manifest::ClusterRole(typed(index, "ClusterRole", value)?),
        "ClusterRoleBinding" => {
            Manifest::ClusterRoleBinding(typed(index, "ClusterRoleBinding", value)?)
        }
        _ => return Err(ManifestError::UnknownKind(kind)),
    };

    Ok(Document {
        namespace,
        manifest,
    })
}

fn typed<K: serde::de::DeserializeOwned>(
    index: usize,
    kind: &'static str,
    value: Value,
) -> Result<K, ManifestError> {
    serde_yaml::from_value(value).map_err(|source| ManifestError::Invalid {
        kind,
        index,
        source,
    })
}
