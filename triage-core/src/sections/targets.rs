//! Allow-list of heading paths whose content is retained.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lowercase a heading and collapse every whitespace run to one space.
pub fn normalize_heading(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Sections of an AWR document that carry requirement content.
const DEFAULT_TARGETS: &[&[&str]] = &[
    &["customer requirements details", "functional requirements"],
    &["customer requirements details", "technical requirements"],
    &["customer requirements details", "required delivery date"],
    &["champ proposed solution", "business solution"],
    &["champ proposed solution", "technical solution"],
    &["champ proposed solution", "limitations"],
    &["timescales and notifications", "delivery date"],
    &["timescales and notifications", "notifications"],
    &["pricing and payment terms", "price", "one-time charges"],
    &["pricing and payment terms", "price", "annual maintenance charges"],
    &["pricing and payment terms", "payment terms", "one-time charges"],
    &["pricing and payment terms", "payment terms", "annual maintenance charges"],
];

/// Immutable set of normalized heading paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPathSet {
    paths: HashSet<Vec<String>>,
}

impl TargetPathSet {
    /// Build from raw paths; every segment is normalized on the way in.
    pub fn new<I, P, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let paths = paths
            .into_iter()
            .map(|p| p.into_iter().map(|s| normalize_heading(s.as_ref())).collect())
            .collect();
        Self { paths }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Membership test for an already-normalized path.
    pub fn contains_normalized(&self, path: &[String]) -> bool {
        self.paths.contains(path)
    }

    /// Membership test for a raw heading path.
    pub fn contains<S: AsRef<str>>(&self, path: &[S]) -> bool {
        let normalized: Vec<String> = path.iter().map(|s| normalize_heading(s.as_ref())).collect();
        self.contains_normalized(&normalized)
    }

    pub(crate) fn has_empty_path(&self) -> bool {
        self.paths
            .iter()
            .any(|p| p.is_empty() || p.iter().any(|s| s.is_empty()))
    }

    /// Paths sorted for stable output.
    pub fn sorted_paths(&self) -> Vec<Vec<String>> {
        let mut paths: Vec<Vec<String>> = self.paths.iter().cloned().collect();
        paths.sort();
        paths
    }
}

impl Default for TargetPathSet {
    fn default() -> Self {
        Self::new(DEFAULT_TARGETS.iter().map(|p| p.iter().copied()))
    }
}

impl Serialize for TargetPathSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.sorted_paths().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TargetPathSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Vec<Vec<String>> = Vec::deserialize(deserializer)?;
        Ok(Self::new(raw))
    }
}
