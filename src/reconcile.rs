//! Expected/observed label reconciliation
//!
//! Decides whether a set of observed `key=value` labels is exactly explained
//! by a set of expected patterns: every label consumed by one pattern, every
//! pattern consuming one label.
//!
//! Two pairing strategies are available:
//!
//! - [`MatchStrategy::FirstFit`] (default): labels are visited in source order
//!   and each takes the first remaining pattern that matches it. This is
//!   greedy and never backtracks, so with overlapping patterns it can report a
//!   mismatch even though a perfect pairing exists.
//! - [`MatchStrategy::Maximum`]: a maximum bipartite matching over the
//!   label/pattern match graph, exact for any pattern set.
//!
//! # Example
//!
//! ```
//! use gfd_verify::labels::compile_all;
//! use gfd_verify::reconcile::Reconciler;
//!
//! let expected = compile_all(["^a=[0-9]+$"]).unwrap();
//! let observed = vec!["a=5".to_string(), "b=6".to_string()];
//!
//! let result = Reconciler::new().reconcile(&expected, &observed);
//! assert!(!result.passed());
//! assert_eq!(result.unexpected, vec!["b=6"]);
//! ```

use tracing::debug;

use crate::labels::ExpectedLabel;

/// Where the observed labels came from; only affects report wording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSource {
    /// Kubernetes node metadata
    Node,
    /// GFD output file
    File,
}

/// How observed labels are paired with expected patterns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchStrategy {
    /// First remaining pattern wins, in label order
    #[default]
    FirstFit,
    /// Maximum one-to-one matching
    Maximum,
}

impl std::str::FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first-fit" | "firstfit" | "greedy" => Ok(Self::FirstFit),
            "maximum" | "max" => Ok(Self::Maximum),
            _ => Err(format!(
                "unknown match strategy '{s}' (use first-fit or maximum)"
            )),
        }
    }
}

/// Drops discovery labels that belong to other feature sources
///
/// A label under `namespace` but not under `agent_prefix` was written by some
/// other NFD source. It is discarded before matching and counts as neither
/// missing nor unexpected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoiseFilter {
    /// Shared feature-discovery label prefix
    pub namespace: String,
    /// Prefix of labels owned by the agent under test
    pub agent_prefix: String,
}

impl NoiseFilter {
    /// Create a filter for the given namespace and agent prefix
    pub fn new(namespace: impl Into<String>, agent_prefix: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            agent_prefix: agent_prefix.into(),
        }
    }

    /// Whether the label should be ignored
    #[must_use]
    pub fn is_noise(&self, label: &str) -> bool {
        label.starts_with(&self.namespace) && !label.starts_with(&self.agent_prefix)
    }
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::new("feature.node.kubernetes.io/", "feature.node.kubernetes.io/gfd-")
    }
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// (label, pattern) pairs that explained each other
    pub matched: Vec<(String, String)>,
    /// Observed labels no pattern accounted for
    pub unexpected: Vec<String>,
    /// Patterns no label satisfied, as written
    pub missing: Vec<String>,
    /// Labels dropped by the noise filter
    pub discarded: Vec<String>,
}

impl Reconciliation {
    /// True when nothing is left over on either side
    #[must_use]
    pub fn passed(&self) -> bool {
        self.unexpected.is_empty() && self.missing.is_empty()
    }

    /// One line per leftover label, then one per leftover pattern
    #[must_use]
    pub fn report_lines(&self, source: LabelSource) -> Vec<String> {
        let prefix = match source {
            LabelSource::Node => "Unexpected label on node",
            LabelSource::File => "Unexpected label",
        };

        self.unexpected
            .iter()
            .map(|label| format!("{prefix}: {label}"))
            .chain(
                self.missing
                    .iter()
                    .map(|pattern| format!("Missing label matching regex: {pattern}")),
            )
            .collect()
    }
}

/// Label reconciler
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    strategy: MatchStrategy,
    filter: Option<NoiseFilter>,
}

impl Reconciler {
    /// First-fit reconciler without a noise filter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pairing strategy
    #[must_use]
    pub fn strategy(mut self, strategy: MatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Discard noise labels before matching
    #[must_use]
    pub fn noise_filter(mut self, filter: NoiseFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Reconcile a snapshot of observed labels against expected patterns
    ///
    /// Inputs are not modified; calling twice with the same inputs gives the
    /// same result.
    #[must_use]
    pub fn reconcile(&self, expected: &[ExpectedLabel], observed: &[String]) -> Reconciliation {
        let mut result = Reconciliation::default();

        let candidates: Vec<&String> = observed
            .iter()
            .filter(|label| match &self.filter {
                Some(filter) if filter.is_noise(label) => {
                    debug!(label = %label, "Discarding label from another feature source");
                    result.discarded.push((*label).clone());
                    false
                }
                _ => true,
            })
            .collect();

        let pairs = match self.strategy {
            MatchStrategy::FirstFit => first_fit(expected, &candidates),
            MatchStrategy::Maximum => maximum(expected, &candidates),
        };

        let mut pattern_used = vec![false; expected.len()];
        for (label_idx, pattern) in pairs.iter().enumerate() {
            match pattern {
                Some(p) => {
                    pattern_used[*p] = true;
                    result
                        .matched
                        .push((candidates[label_idx].clone(), expected[*p].to_string()));
                }
                None => result.unexpected.push(candidates[label_idx].clone()),
            }
        }

        result.missing = expected
            .iter()
            .zip(&pattern_used)
            .filter(|(_, used)| !**used)
            .map(|(p, _)| p.to_string())
            .collect();

        debug!(
            matched = result.matched.len(),
            unexpected = result.unexpected.len(),
            missing = result.missing.len(),
            discarded = result.discarded.len(),
            strategy = ?self.strategy,
            "Reconciled labels"
        );

        result
    }
}

/// Greedy pairing: for each label, the first unused pattern that matches
fn first_fit(expected: &[ExpectedLabel], labels: &[&String]) -> Vec<Option<usize>> {
    let mut used = vec![false; expected.len()];

    labels
        .iter()
        .map(|label| {
            let hit = expected
                .iter()
                .enumerate()
                .position(|(i, p)| !used[i] && p.matches(label))?;
            used[hit] = true;
            Some(hit)
        })
        .collect()
}

/// Maximum bipartite matching by augmenting paths
fn maximum(expected: &[ExpectedLabel], labels: &[&String]) -> Vec<Option<usize>> {
    let adjacency: Vec<Vec<usize>> = labels
        .iter()
        .map(|label| {
            expected
                .iter()
                .enumerate()
                .filter(|(_, p)| p.matches(label))
                .map(|(i, _)| i)
                .collect()
        })
        .collect();

    // owner[pattern] = label currently holding it
    let mut owner: Vec<Option<usize>> = vec![None; expected.len()];
    for label in 0..labels.len() {
        let mut seen = vec![false; expected.len()];
        augment(label, &adjacency, &mut seen, &mut owner);
    }

    let mut pairs = vec![None; labels.len()];
    for (pattern, label) in owner.iter().enumerate() {
        if let Some(label) = label {
            pairs[*label] = Some(pattern);
        }
    }
    pairs
}

fn augment(
    label: usize,
    adjacency: &[Vec<usize>],
    seen: &mut [bool],
    owner: &mut [Option<usize>],
) -> bool {
    for &pattern in &adjacency[label] {
        if seen[pattern] {
            continue;
        }
        seen[pattern] = true;

        let free = match owner[pattern] {
            None => true,
            Some(holder) => augment(holder, adjacency, seen, owner),
        };
        if free {
            owner[pattern] = Some(label);
            return true;
        }
    }
    false
}
