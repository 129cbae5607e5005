//! Configuration types for gfd-verify
//!
//! These types define how each verification flow is run.
//! Build them programmatically - no config files needed.
//!
//! # Example
//!
//! ```
//! use gfd_verify::config::{E2eConfig, IntegrationConfig};
//! use std::time::Duration;
//!
//! let e2e = E2eConfig::new("./gfd.yaml", "./nfd.yaml")
//!     .context("kind-gpu")
//!     .watch_timeout(Duration::from_secs(300));
//!
//! let integration = IntegrationConfig::new("nvidia/gpu-feature-discovery:test")
//!     .expected_output("./tests/expected-output.txt")
//!     .poll_timeout_secs(120);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::reconcile::{MatchStrategy, NoiseFilter};

/// Label GFD writes last on every labeling pass
pub const DEFAULT_SENTINEL_LABEL: &str = "feature.node.kubernetes.io/gfd-nvidia-timestamp";

/// Directory NFD reads feature files from, mounted into the GFD container
pub const DEFAULT_MOUNT_TARGET: &str = "/etc/kubernetes/node-feature-discovery/features.d";

/// Name of the file GFD writes inside the mount
pub const DEFAULT_OUTPUT_FILE: &str = "gfd";

/// Labels every GFD node is expected to carry once the agent has run
pub fn default_expected_patterns() -> Vec<String> {
    [
        "feature.node.kubernetes.io/gfd-nvidia-driver-version=[0-9.]+",
        "feature.node.kubernetes.io/gfd-nvidia-model=[A-Za-z]+",
        "feature.node.kubernetes.io/gfd-nvidia-memory=[0-9]*",
        "feature.node.kubernetes.io/gfd-nvidia-timestamp=[0-9]{10}",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Kubernetes end-to-end flow configuration
#[derive(Debug, Clone)]
pub struct E2eConfig {
    /// GFD manifest stream (applied first)
    pub gfd_manifest: PathBuf,

    /// NFD manifest stream (applied second)
    pub nfd_manifest: PathBuf,

    /// Kubeconfig path; ambient config when unset
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context; current context when unset
    pub context: Option<String>,

    /// Node to check; first listed node when unset
    pub node: Option<String>,

    /// Soft bound on the node watch
    pub watch_timeout: Duration,

    /// Label whose appearance ends the watch
    pub sentinel_label: String,

    /// Expected label patterns produced by GFD
    pub expected_patterns: Vec<String>,

    /// Discovery labels that are neither expected nor unexpected
    pub noise_filter: NoiseFilter,

    /// How observed labels are paired with patterns
    pub strategy: MatchStrategy,
}

impl E2eConfig {
    /// Create a config for the given GFD and NFD manifests
    pub fn new(gfd_manifest: impl Into<PathBuf>, nfd_manifest: impl Into<PathBuf>) -> Self {
        Self {
            gfd_manifest: gfd_manifest.into(),
            nfd_manifest: nfd_manifest.into(),
            kubeconfig: None,
            context: None,
            node: None,
            watch_timeout: Duration::from_secs(180),
            sentinel_label: DEFAULT_SENTINEL_LABEL.to_string(),
            expected_patterns: default_expected_patterns(),
            noise_filter: NoiseFilter::default(),
            strategy: MatchStrategy::default(),
        }
    }

    /// Set kubeconfig path
    pub fn kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    /// Set kubeconfig context
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Check a specific node instead of the first one listed
    pub fn node(mut self, name: impl Into<String>) -> Self {
        self.node = Some(name.into());
        self
    }

    /// Set the node watch bound
    pub fn watch_timeout(mut self, timeout: Duration) -> Self {
        self.watch_timeout = timeout;
        self
    }

    /// Set the sentinel label key
    pub fn sentinel_label(mut self, label: impl Into<String>) -> Self {
        self.sentinel_label = label.into();
        self
    }

    /// Replace the expected GFD patterns
    pub fn expected_patterns(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.expected_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the noise filter
    pub fn noise_filter(mut self, filter: NoiseFilter) -> Self {
        self.noise_filter = filter;
        self
    }

    /// Set the match strategy
    pub fn strategy(mut self, strategy: MatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Standalone container integration flow configuration
#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    /// GFD image to run
    pub image: String,

    /// File with one expected label regex per line
    pub expected_output: PathBuf,

    /// Container path the scratch directory is bind-mounted to
    pub mount_target: String,

    /// File name GFD writes inside the mount
    pub output_file: String,

    /// Delay between output file checks
    pub poll_interval: Duration,

    /// Give up waiting for output after this long; `None` waits forever
    pub poll_timeout: Option<Duration>,

    /// How observed labels are paired with patterns
    pub strategy: MatchStrategy,
}

impl IntegrationConfig {
    /// Create a config for the given image
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            expected_output: PathBuf::from("./expected-output.txt"),
            mount_target: DEFAULT_MOUNT_TARGET.to_string(),
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
            poll_interval: Duration::from_secs(1),
            poll_timeout: Some(Duration::from_secs(300)),
            strategy: MatchStrategy::default(),
        }
    }

    /// Set expected-output file path
    pub fn expected_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.expected_output = path.into();
        self
    }

    /// Set container mount target
    pub fn mount_target(mut self, target: impl Into<String>) -> Self {
        self.mount_target = target.into();
        self
    }

    /// Set output file name
    pub fn output_file(mut self, name: impl Into<String>) -> Self {
        self.output_file = name.into();
        self
    }

    /// Set polling interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set polling timeout
    pub fn poll_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set polling timeout in seconds
    pub fn poll_timeout_secs(mut self, secs: u64) -> Self {
        self.poll_timeout = Some(Duration::from_secs(secs));
        self
    }

    /// Set the match strategy
    pub fn strategy(mut self, strategy: MatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_e2e_config_defaults() {
        let config = E2eConfig::new("gfd.yaml", "nfd.yaml");

        assert_eq!(config.gfd_manifest, PathBuf::from("gfd.yaml"));
        assert_eq!(config.nfd_manifest, PathBuf::from("nfd.yaml"));
        assert_eq!(config.watch_timeout, Duration::from_secs(180));
        assert_eq!(config.sentinel_label, DEFAULT_SENTINEL_LABEL);
        assert_eq!(config.expected_patterns.len(), 4);
        assert_eq!(config.strategy, MatchStrategy::FirstFit);
        assert!(config.node.is_none());
    }

    #[test]
    fn test_e2e_config_builder() {
        let config = E2eConfig::new("gfd.yaml", "nfd.yaml")
            .kubeconfig("~/.kube/gpu")
            .context("gpu-context")
            .node("gpu-worker-0")
            .watch_timeout(Duration::from_secs(30))
            .sentinel_label("nvidia.com/gfd.timestamp")
            .expected_patterns(["a=.*"])
            .strategy(MatchStrategy::Maximum);

        assert_eq!(config.kubeconfig, Some(PathBuf::from("~/.kube/gpu")));
        assert_eq!(config.context, Some("gpu-context".to_string()));
        assert_eq!(config.node, Some("gpu-worker-0".to_string()));
        assert_eq!(config.watch_timeout, Duration::from_secs(30));
        assert_eq!(config.sentinel_label, "nvidia.com/gfd.timestamp");
        assert_eq!(config.expected_patterns, vec!["a=.*".to_string()]);
        assert_eq!(config.strategy, MatchStrategy::Maximum);
    }

    #[test]
    fn test_integration_config_defaults() {
        let config = IntegrationConfig::new("gfd:test");

        assert_eq!(config.image, "gfd:test");
        assert_eq!(config.expected_output, PathBuf::from("./expected-output.txt"));
        assert_eq!(config.mount_target, DEFAULT_MOUNT_TARGET);
        assert_eq!(config.output_file, "gfd");
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.poll_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_integration_config_unbounded_poll() {
        let config = IntegrationConfig::new("gfd:test")
            .poll_timeout(None)
            .poll_interval(Duration::from_millis(100))
            .output_file("labels");

        assert!(config.poll_timeout.is_none());
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.output_file, "labels");
    }

    #[test]
    fn test_default_patterns_cover_timestamp_sentinel() {
        let patterns = default_expected_patterns();
        assert!(patterns
            .iter()
            .any(|p| p.starts_with(DEFAULT_SENTINEL_LABEL)));
    }
}
