//! Label rendering and expected-pattern loading
//!
//! Labels travel as flat `key=value` strings regardless of where they were
//! read from: Kubernetes node metadata or the file GFD writes into the
//! NFD features directory.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Error type for label and pattern loading
#[derive(Debug, thiserror::Error)]
pub enum LabelsError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid label pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Render a label as `key=value`
#[must_use]
pub fn render(key: &str, value: &str) -> String {
    format!("{key}={value}")
}

/// Render every entry of a label map, in key order
#[must_use]
pub fn from_map(labels: &BTreeMap<String, String>) -> Vec<String> {
    labels.iter().map(|(k, v)| render(k, v)).collect()
}

/// Split text into one trimmed entry per non-blank line
#[must_use]
pub fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Read a GFD output file into labels
pub async fn read_output_file(path: &Path) -> Result<Vec<String>, LabelsError> {
    let text = read(path).await?;
    Ok(parse_lines(&text))
}

/// Read an expected-output file, one regex per line
pub async fn read_expected_file(path: &Path) -> Result<Vec<ExpectedLabel>, LabelsError> {
    let text = read(path).await?;
    compile_all(parse_lines(&text))
}

async fn read(path: &Path) -> Result<String, LabelsError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LabelsError::Read {
            path: path.display().to_string(),
            source,
        })
}

/// Compile a batch of patterns, failing on the first invalid one
pub fn compile_all(
    patterns: impl IntoIterator<Item = impl AsRef<str>>,
) -> Result<Vec<ExpectedLabel>, LabelsError> {
    patterns
        .into_iter()
        .map(|p| ExpectedLabel::pattern(p.as_ref()))
        .collect()
}

/// An expected label: a regex that must match one whole `key=value` string
#[derive(Debug, Clone)]
pub struct ExpectedLabel {
    source: String,
    regex: Regex,
}

impl ExpectedLabel {
    /// Compile a pattern; it must match the entire label
    pub fn pattern(pattern: &str) -> Result<Self, LabelsError> {
        let regex =
            Regex::new(&format!("^(?:{pattern})$")).map_err(|source| LabelsError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// Expect exactly this `key=value` label
    pub fn literal(key: &str, value: &str) -> Result<Self, LabelsError> {
        Self::pattern(&regex::escape(&render(key, value)))
    }

    /// The pattern as written
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern matches the whole label
    #[must_use]
    pub fn matches(&self, label: &str) -> bool {
        self.regex.is_match(label)
    }
}

impl fmt::Display for ExpectedLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
