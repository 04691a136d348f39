//! Heading-path extraction over a styled paragraph stream.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::targets::{normalize_heading, TargetPathSet};
use super::SectionTree;
use crate::error::SectionExtractionError;

const HEADING_PREFIX: &str = "Heading";

/// One paragraph of a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Style label, e.g. `Heading2` or `Normal`.
    pub style: String,
    pub text: String,
}

impl Paragraph {
    pub fn new(style: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            style: style.into(),
            text: text.into(),
        }
    }

    pub fn heading(level: usize, text: impl Into<String>) -> Self {
        Self::new(format!("{HEADING_PREFIX}{level}"), text)
    }

    pub fn body(text: impl Into<String>) -> Self {
        Self::new("Normal", text)
    }
}

fn level_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+").expect("static regex"))
}

/// Heading level of a style label.
///
/// `None` for body styles; `Some(Err(..))` for a heading style without a
/// parseable numeral.
pub fn heading_level(style: &str) -> Option<Result<usize, SectionExtractionError>> {
    if !style.starts_with(HEADING_PREFIX) {
        return None;
    }
    let parsed = level_pattern()
        .find(style)
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .ok_or_else(|| SectionExtractionError {
            style: style.to_string(),
        });
    Some(parsed)
}

/// Streaming extractor. Holds the open heading path and the body buffer of
/// the current section; both live only for one document.
#[derive(Debug)]
pub struct HeadingPathExtractor<'a> {
    targets: &'a TargetPathSet,
    current_path: Vec<String>,
    section_buffer: Vec<String>,
    tree: SectionTree,
}

impl<'a> HeadingPathExtractor<'a> {
    pub fn new(targets: &'a TargetPathSet) -> Self {
        Self {
            targets,
            current_path: Vec::new(),
            section_buffer: Vec::new(),
            tree: SectionTree::new(),
        }
    }

    /// Feed the next paragraph.
    pub fn push(&mut self, paragraph: &Paragraph) {
        let text = paragraph.text.trim();
        if text.is_empty() {
            return;
        }

        let Some(level) = heading_level(&paragraph.style) else {
            self.section_buffer.push(text.to_string());
            return;
        };

        let level = level.unwrap_or_else(|e| {
            warn!(error = %e, heading = text, "Treating heading as level 1");
            1
        });

        self.flush();
        self.section_buffer.clear();
        self.current_path.truncate(level.saturating_sub(1));
        self.current_path.push(text.to_string());
    }

    /// Flush the final section and return the tree.
    pub fn finish(mut self) -> SectionTree {
        self.flush();
        self.tree
    }

    fn flush(&mut self) {
        if self.current_path.is_empty() {
            return;
        }
        let normalized: Vec<String> = self
            .current_path
            .iter()
            .map(|s| normalize_heading(s))
            .collect();
        if !self.targets.contains_normalized(&normalized) {
            return;
        }
        let body = self.section_buffer.join("\n").trim().to_string();
        debug!(path = ?self.current_path, chars = body.len(), "Retained section");
        self.tree.insert_leaf(&self.current_path, body);
    }
}

/// Extract the target sections of one document.
pub fn extract_sections<'p, I>(paragraphs: I, targets: &TargetPathSet) -> SectionTree
where
    I: IntoIterator<Item = &'p Paragraph>,
{
    let mut extractor = HeadingPathExtractor::new(targets);
    for paragraph in paragraphs {
        extractor.push(paragraph);
    }
    extractor.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::SectionNode;

    fn leaf(tree: &SectionTree, path: &[&str]) -> Option<String> {
        match tree.get_path(path) {
            Some(SectionNode::Leaf(text)) => Some(text.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_heading_level_parsing() {
        assert_eq!(heading_level("Heading2"), Some(Ok(2)));
        assert_eq!(heading_level("Heading 3"), Some(Ok(3)));
        assert!(heading_level("Normal").is_none());
        assert!(matches!(heading_level("Heading"), Some(Err(_))));
    }

    #[test]
    fn test_target_section_retained() {
        let targets = TargetPathSet::default();
        let doc = vec![
            Paragraph::heading(1, "Customer Requirements Details"),
            Paragraph::heading(2, "Functional Requirements"),
            Paragraph::body("Must support X"),
        ];
        let tree = extract_sections(&doc, &targets);
        assert_eq!(
            leaf(&tree, &["Customer Requirements Details", "Functional Requirements"]),
            Some("Must support X".to_string())
        );
    }

    #[test]
    fn test_non_target_section_dropped() {
        let targets = TargetPathSet::default();
        let doc = vec![
            Paragraph::heading(1, "Customer Requirements Details"),
            Paragraph::heading(2, "Irrelevant Section"),
            Paragraph::body("ignore me"),
        ];
        let tree = extract_sections(&doc, &targets);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_body_paragraphs_joined_with_newline() {
        let targets = TargetPathSet::default();
        let doc = vec![
            Paragraph::heading(1, "Champ Proposed Solution"),
            Paragraph::heading(2, "Limitations"),
            Paragraph::body("  first  "),
            Paragraph::body(""),
            Paragraph::body("   "),
            Paragraph::body("second"),
        ];
        let tree = extract_sections(&doc, &targets);
        assert_eq!(
            leaf(&tree, &["Champ Proposed Solution", "Limitations"]),
            Some("first\nsecond".to_string())
        );
    }

    #[test]
    fn test_empty_paragraph_does_not_affect_path() {
        let targets = TargetPathSet::default();
        let doc = vec![
            Paragraph::heading(1, "Champ Proposed Solution"),
            Paragraph::heading(2, "   "),
            Paragraph::heading(2, "Business Solution"),
            Paragraph::body("Use the shared platform"),
        ];
        let tree = extract_sections(&doc, &targets);
        assert_eq!(
            leaf(&tree, &["Champ Proposed Solution", "Business Solution"]),
            Some("Use the shared platform".to_string())
        );
    }

    #[test]
    fn test_consecutive_headings_store_empty_string() {
        let targets = TargetPathSet::default();
        let doc = vec![
            Paragraph::heading(1, "Customer Requirements Details"),
            Paragraph::heading(2, "Functional Requirements"),
            Paragraph::heading(2, "Technical Requirements"),
            Paragraph::body("IPv6 only"),
        ];
        let tree = extract_sections(&doc, &targets);
        assert_eq!(
            leaf(&tree, &["Customer Requirements Details", "Functional Requirements"]),
            Some(String::new())
        );
        assert_eq!(
            leaf(&tree, &["Customer Requirements Details", "Technical Requirements"]),
            Some("IPv6 only".to_string())
        );
    }

    #[test]
    fn test_shallower_heading_discards_orphaned_segments() {
        let targets = TargetPathSet::default();
        let doc = vec![
            Paragraph::heading(1, "Pricing and Payment Terms"),
            Paragraph::heading(2, "Price"),
            Paragraph::heading(3, "One-Time Charges"),
            Paragraph::body("10k"),
            Paragraph::heading(2, "Payment Terms"),
            Paragraph::heading(3, "Annual Maintenance Charges"),
            Paragraph::body("2k per year"),
        ];
        let tree = extract_sections(&doc, &targets);
        assert_eq!(
            leaf(&tree, &["Pricing and Payment Terms", "Price", "One-Time Charges"]),
            Some("10k".to_string())
        );
        assert_eq!(
            leaf(
                &tree,
                &["Pricing and Payment Terms", "Payment Terms", "Annual Maintenance Charges"]
            ),
            Some("2k per year".to_string())
        );
        assert!(tree
            .get_path(&["Pricing and Payment Terms", "Price", "Payment Terms"])
            .is_none());
    }

    #[test]
    fn test_unparseable_level_resets_path() {
        let targets = TargetPathSet::new(vec![vec!["scope"]]);
        let doc = vec![
            Paragraph::heading(1, "Overview"),
            Paragraph::heading(2, "Background"),
            Paragraph::new("Heading", "Scope"),
            Paragraph::body("Everything in region EU"),
        ];
        let tree = extract_sections(&doc, &targets);
        assert_eq!(leaf(&tree, &["Scope"]), Some("Everything in region EU".to_string()));
    }

    #[test]
    fn test_body_before_first_heading_discarded() {
        let targets = TargetPathSet::default();
        let doc = vec![Paragraph::body("Cover page"), Paragraph::body("Version 3")];
        assert!(extract_sections(&doc, &targets).is_empty());
    }

    #[test]
    fn test_matching_is_case_and_whitespace_insensitive() {
        let targets = TargetPathSet::default();
        let doc = vec![
            Paragraph::heading(1, "TIMESCALES  AND Notifications"),
            Paragraph::heading(2, "Delivery   Date"),
            Paragraph::body("Q3"),
        ];
        let tree = extract_sections(&doc, &targets);
        assert_eq!(
            leaf(&tree, &["TIMESCALES  AND Notifications", "Delivery   Date"]),
            Some("Q3".to_string())
        );
    }
}
