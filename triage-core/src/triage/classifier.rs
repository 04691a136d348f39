//! Pure classification: no I/O, deterministic for a given input.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::TriageConfig;
use crate::ports::{Notification, SimilarityHit, TicketUpdate};
use crate::ticket::{append_marker, labels, Ticket};

/// Metadata keys checked, in order, for a hit's ticket reference.
const ID_KEYS: [&str; 3] = ["ticket_id", "AWR_DOC_JIRA_REF", "key"];
const URL_KEYS: [&str; 2] = ["url", "JIRA_AWR_URL"];
const TITLE_KEYS: [&str; 3] = ["summary", "JIRA_AWR_Title", "title"];

/// Triage disposition. Derived; persisted only through the label it writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    New,
    Review,
    Duplicate,
}

impl Classification {
    pub fn label(self) -> &'static str {
        match self {
            Self::New => labels::AI_NEW,
            Self::Review => labels::AI_REVIEW,
            Self::Duplicate => labels::AI_DUPLICATE,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Review => write!(f, "REVIEW"),
            Self::Duplicate => write!(f, "DUPLICATE"),
        }
    }
}

/// Best candidate returned by the similarity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub candidate_id: String,
    pub url: Option<String>,
    /// Title of the candidate, when the store carries one.
    pub title: Option<String>,
    /// Similarity in [0, 1], 1 = identical.
    pub similarity: f64,
}

impl SimilarityMatch {
    /// Translate a store hit. Similarity is `1 − distance`, clamped to [0, 1].
    pub fn from_hit(hit: &SimilarityHit) -> Self {
        let lookup = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| hit.metadata.get(*k))
                .find(|v| !v.trim().is_empty())
                .cloned()
        };
        Self {
            candidate_id: lookup(&ID_KEYS).unwrap_or_else(|| hit.id.clone()),
            url: lookup(&URL_KEYS),
            title: lookup(&TITLE_KEYS),
            similarity: (1.0 - hit.distance).clamp(0.0, 1.0),
        }
    }

    /// Closest hit of a query result, ignoring any entry that refers to
    /// `own_id` (the ticket being classified).
    pub fn best_of(hits: &[SimilarityHit], own_id: &str) -> Option<Self> {
        hits.iter()
            .filter(|h| h.distance.is_finite() && h.id != own_id)
            .map(|h| (h.distance, Self::from_hit(h)))
            .filter(|(_, m)| m.candidate_id != own_id)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, m)| m)
    }
}

/// What to write to the similarity index for a NEW ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPlan {
    pub document: String,
    pub metadata: BTreeMap<String, String>,
}

/// Side effects implied by a classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriagePlan {
    pub update: TicketUpdate,
    /// Present only for NEW.
    pub index: Option<IndexPlan>,
    pub notification: Option<Notification>,
}

/// Decide the disposition of `ticket` given its best match.
pub fn classify(
    ticket: &Ticket,
    matched: Option<&SimilarityMatch>,
    config: &TriageConfig,
) -> (Classification, TriagePlan) {
    let cutoffs = config.thresholds.get(ticket.priority);

    let classification = match matched {
        None => Classification::New,
        Some(m) if m.similarity >= cutoffs.duplicate => Classification::Duplicate,
        Some(m) if m.similarity >= cutoffs.review => Classification::Review,
        Some(_) => Classification::New,
    };

    let plan = match (classification, matched) {
        (Classification::Duplicate, Some(m)) => duplicate_plan(ticket, m, config),
        (Classification::Review, Some(m)) => review_plan(ticket, m, config),
        _ => new_plan(ticket),
    };

    (classification, plan)
}

fn duplicate_plan(ticket: &Ticket, m: &SimilarityMatch, config: &TriageConfig) -> TriagePlan {
    let marker = format!("[DUPLICATE: {}]", m.candidate_id);
    TriagePlan {
        update: TicketUpdate::default()
            .add_label(labels::AI_DUPLICATE)
            .with_summary(append_marker(&ticket.summary, &marker)),
        index: None,
        notification: Some(Notification {
            recipient: config.recipient.clone(),
            subject: format!("[Triage] {} flagged as duplicate of {}", ticket.id, m.candidate_id),
            body: format!(
                "Ticket {} ({}) matches {} with similarity {:.3}.{}\nIt has been labelled {} and is pending closure.",
                ticket.id,
                ticket.summary,
                m.candidate_id,
                m.similarity,
                url_line(m),
                labels::AI_DUPLICATE,
            ),
        }),
    }
}

fn review_plan(ticket: &Ticket, m: &SimilarityMatch, config: &TriageConfig) -> TriagePlan {
    let marker = format!("[REVIEW NEEDED: {}]", m.candidate_id);
    let title = m.title.as_deref().unwrap_or("(untitled)");
    TriagePlan {
        update: TicketUpdate::default()
            .add_label(labels::AI_REVIEW)
            .with_summary(append_marker(&ticket.summary, &marker))
            .with_comment(format!(
                "*AI Classification: REVIEW NEEDED*\nPossible match: {} \"{}\" (similarity {:.2}).{}",
                m.candidate_id,
                title,
                m.similarity,
                url_line(m),
            )),
        index: None,
        notification: Some(Notification {
            recipient: config.recipient.clone(),
            subject: format!("[Triage] {} needs review", ticket.id),
            body: format!(
                "Ticket {} ({}) is similar to {} \"{}\" (similarity {:.3}).{}\nPlease confirm or reject the match.",
                ticket.id,
                ticket.summary,
                m.candidate_id,
                title,
                m.similarity,
                url_line(m),
            ),
        }),
    }
}

/// Index entry content for a NEW ticket.
pub fn index_plan(ticket: &Ticket) -> IndexPlan {
    let mut metadata = BTreeMap::new();
    metadata.insert("ticket_id".to_string(), ticket.id.clone());
    metadata.insert("summary".to_string(), ticket.summary.clone());
    metadata.insert("priority".to_string(), ticket.priority.to_string());
    metadata.insert("created".to_string(), ticket.created.to_rfc3339());
    metadata.insert("type".to_string(), "AWR".to_string());
    IndexPlan {
        document: ticket.embedding_text(),
        metadata,
    }
}

fn new_plan(ticket: &Ticket) -> TriagePlan {
    TriagePlan {
        update: TicketUpdate::default()
            .add_label(labels::AI_NEW)
            .with_comment("*AI Classification: NEW TICKET*\nNo similar tickets found."),
        index: Some(index_plan(ticket)),
        notification: None,
    }
}

fn url_line(m: &SimilarityMatch) -> String {
    m.url
        .as_deref()
        .map(|u| format!("\nLink: {u}"))
        .unwrap_or_default()
}
