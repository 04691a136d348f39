//! Ticket model shared by the classifier, the escalation sweep and the bridges.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Labels written by the triage pipeline.
pub mod labels {
    pub const AI_NEW: &str = "AI_NEW";
    pub const AI_REVIEW: &str = "AI_REVIEW";
    pub const AI_DUPLICATE: &str = "AI_DUPLICATE";
    pub const ESCALATED: &str = "ESCALATED";
    /// Marks tickets created by the sample loader.
    pub const AUTO_LOADED: &str = "auto-loaded";

    /// Any of these means the ticket has already been through triage.
    pub const TRIAGE_LABELS: [&str; 4] = [AI_NEW, AI_REVIEW, AI_DUPLICATE, ESCALATED];
}

/// Ticket priority, ordered `Low < Medium < High < Urgent < ShowStopper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
    ShowStopper,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::ShowStopper,
        Priority::Urgent,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    /// Map a tracker priority name onto the triage scale.
    ///
    /// Unknown names fall back to `Medium`.
    pub fn from_tracker_name(name: &str) -> Self {
        Self::parse(name).unwrap_or(Priority::Medium)
    }

    /// Strict parse used for configuration keys.
    pub fn parse(name: &str) -> Option<Self> {
        let key: String = name
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match key.as_str() {
            "showstopper" | "highest" | "blocker" => Some(Priority::ShowStopper),
            "urgent" | "critical" => Some(Priority::Urgent),
            "high" | "major" => Some(Priority::High),
            "medium" | "normal" => Some(Priority::Medium),
            "low" | "lowest" | "minor" | "trivial" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShowStopper => write!(f, "SHOW_STOPPER"),
            Self::Urgent => write!(f, "URGENT"),
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
        }
    }
}

/// A tracker ticket, translated out of the tracker's own representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    pub priority: Priority,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Ticket {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Whether any triage label is already present.
    pub fn is_triaged(&self) -> bool {
        labels::TRIAGE_LABELS.iter().any(|l| self.has_label(l))
    }

    /// Text submitted to the embedding service.
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.summary, self.description)
    }
}

/// Append a bracketed marker to a summary unless it is already there.
pub fn append_marker(summary: &str, marker: &str) -> String {
    if summary.contains(marker) {
        summary.to_string()
    } else {
        format!("{} {}", summary.trim_end(), marker)
    }
}
