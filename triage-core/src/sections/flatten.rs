//! Flattening of a section tree into path-keyed embedding input.

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::{SectionNode, SectionTree};

/// Separator used between path segments in flattened keys.
pub const DEFAULT_SEPARATOR: &str = " > ";

/// Joined heading path → whitespace-normalized text, in depth-first
/// pre-order of the source tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatSections {
    entries: Vec<(String, String)>,
}

impl FlatSections {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// View as a single-level tree (each key becomes one leaf).
    pub fn to_tree(&self) -> SectionTree {
        let mut tree = SectionTree::new();
        for (k, v) in &self.entries {
            tree.insert_leaf(&[k.as_str()], v.clone());
        }
        tree
    }

    fn insert(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.entries.push((key, value)),
        }
    }
}

impl IntoIterator for FlatSections {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for FlatSections {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Flatten `tree` into `segment_1{sep}segment_2{sep}... → text`.
pub fn flatten(tree: &SectionTree, separator: &str) -> FlatSections {
    let mut out = FlatSections::default();
    walk(tree, None, separator, &mut out);
    out
}

fn walk(tree: &SectionTree, prefix: Option<&str>, separator: &str, out: &mut FlatSections) {
    for (heading, node) in tree.iter() {
        let key = match prefix {
            Some(p) => format!("{p}{separator}{heading}"),
            None => heading.to_string(),
        };
        match node {
            SectionNode::Leaf(text) => out.insert(key, collapse_whitespace(text)),
            SectionNode::Branch(child) => walk(child, Some(&key), separator, out),
        }
    }
}
