//! Section extraction for semi-structured requirement documents.
//!
//! A document arrives as an ordered stream of styled paragraphs. Heading
//! styles (`Heading<N>`) open a section at depth N; everything else is body
//! text. Only sections whose normalized heading path is in the configured
//! [`TargetPathSet`] are kept, so most of a document is intentionally dropped.
//!
//! ```text
//! [(Heading1, "Customer Requirements Details"),
//!  (Heading2, "Functional Requirements"),
//!  (Normal,   "Must support X")]
//!        │ extract_sections
//!        ▼
//! Branch { "Customer Requirements Details":
//!          Branch { "Functional Requirements": Leaf("Must support X") } }
//!        │ flatten(" > ")
//!        ▼
//! { "Customer Requirements Details > Functional Requirements": "Must support X" }
//! ```

pub mod extractor;
pub mod flatten;
pub mod targets;

pub use extractor::{extract_sections, heading_level, HeadingPathExtractor, Paragraph};
pub use flatten::{flatten, FlatSections, DEFAULT_SEPARATOR};
pub use targets::{normalize_heading, TargetPathSet};

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::warn;

/// A node in the section tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionNode {
    /// Body text retained for a target path.
    Leaf(String),
    /// Nested headings, in document order.
    Branch(SectionTree),
}

/// Heading text → node, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionTree {
    entries: Vec<(String, SectionNode)>,
}

impl SectionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, heading: &str) -> Option<&SectionNode> {
        self.entries
            .iter()
            .find(|(k, _)| k == heading)
            .map(|(_, v)| v)
    }

    /// Look up a node by its full heading path.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&SectionNode> {
        let (first, rest) = path.split_first()?;
        let node = self.get(first.as_ref())?;
        if rest.is_empty() {
            return Some(node);
        }
        match node {
            SectionNode::Branch(tree) => tree.get_path(rest),
            SectionNode::Leaf(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SectionNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Insert a leaf at `path`, creating branches top-down.
    ///
    /// An existing leaf at the same path is overwritten in place. A leaf
    /// sitting where a branch is needed is replaced by that branch.
    pub fn insert_leaf<S: AsRef<str>>(&mut self, path: &[S], text: String) {
        let Some((first, rest)) = path.split_first() else {
            return;
        };
        let key = first.as_ref();

        if rest.is_empty() {
            match self.entries.iter_mut().find(|(k, _)| k == key) {
                Some((_, node)) => *node = SectionNode::Leaf(text),
                None => self.entries.push((key.to_string(), SectionNode::Leaf(text))),
            }
            return;
        }

        let idx = match self.entries.iter().position(|(k, _)| k == key) {
            Some(idx) => idx,
            None => {
                self.entries
                    .push((key.to_string(), SectionNode::Branch(SectionTree::new())));
                self.entries.len() - 1
            }
        };

        let node = &mut self.entries[idx].1;
        if let SectionNode::Leaf(_) = node {
            warn!(heading = key, "Section leaf replaced by nested target section");
            *node = SectionNode::Branch(SectionTree::new());
        }
        if let SectionNode::Branch(tree) = node {
            tree.insert_leaf(rest, text);
        }
    }
}

impl Serialize for SectionTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl Serialize for SectionNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Leaf(text) => serializer.serialize_str(text),
            Self::Branch(tree) => tree.serialize(serializer),
        }
    }
}
