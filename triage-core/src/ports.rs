//! Interfaces of the external collaborators.
//!
//! The core never holds a live SDK object: bridges translate tracker issues
//! and store query rows into the field-typed structs below at the boundary.
//! In-memory implementations live in [`crate::in_memory`].

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, NotificationError, SimilarityStoreError, TrackerError};
use crate::ticket::{Priority, Ticket};

/// Text → fixed-length vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Vector length produced by this embedder.
    fn dimension(&self) -> usize;
}

/// One row of a nearest-neighbour query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub id: String,
    /// Store-reported distance; smaller is closer.
    pub distance: f64,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// One entry written to the similarity index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: BTreeMap<String, String>,
}

/// Nearest-neighbour store. `upsert` is idempotent by id.
#[async_trait]
pub trait SimilarityStore: Send + Sync {
    /// Up to `top_k` hits, closest first.
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SimilarityHit>, SimilarityStoreError>;

    async fn upsert(&self, entry: IndexEntry) -> Result<(), SimilarityStoreError>;

    /// Bulk variant used by corpus loading.
    async fn upsert_batch(&self, entries: Vec<IndexEntry>) -> Result<usize, SimilarityStoreError> {
        let mut written = 0;
        for entry in entries {
            self.upsert(entry).await?;
            written += 1;
        }
        Ok(written)
    }

    async fn count(&self) -> Result<usize, SimilarityStoreError>;

    /// Whether an entry with this id is stored.
    async fn contains(&self, id: &str) -> Result<bool, SimilarityStoreError>;
}

/// Mutation applied to one ticket.
///
/// Labels are expressed as additions and removals so that every write is a
/// set merge; applying the same update twice leaves the same label set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketUpdate {
    #[serde(default)]
    pub add_labels: BTreeSet<String>,
    #[serde(default)]
    pub remove_labels: BTreeSet<String>,
    /// Replacement summary, if any.
    #[serde(default)]
    pub summary: Option<String>,
    /// Comment to attach, if any.
    #[serde(default)]
    pub comment: Option<String>,
}

impl TicketUpdate {
    pub fn add_label(mut self, label: &str) -> Self {
        self.remove_labels.remove(label);
        self.add_labels.insert(label.to_string());
        self
    }

    pub fn remove_label(mut self, label: &str) -> Self {
        self.add_labels.remove(label);
        self.remove_labels.insert(label.to_string());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add_labels.is_empty()
            && self.remove_labels.is_empty()
            && self.summary.is_none()
            && self.comment.is_none()
    }

    /// Resulting label set: `(labels \ remove) ∪ add`.
    pub fn merged_labels(&self, labels: &BTreeSet<String>) -> BTreeSet<String> {
        labels
            .difference(&self.remove_labels)
            .cloned()
            .chain(self.add_labels.iter().cloned())
            .collect()
    }
}

/// Structured ticket search used by the escalation sweep and batch runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TicketQuery {
    /// Tickets carrying `label` whose last update is strictly before `updated_before`.
    StaleWithLabel {
        label: String,
        updated_before: DateTime<Utc>,
    },
    /// Open tickets that carry none of the triage labels.
    Untriaged { max_results: usize },
    /// Tracker-native query text, passed through verbatim.
    Raw { query: String, max_results: usize },
}

/// Fields for creating a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTicket {
    pub summary: String,
    pub description: String,
    pub priority: Option<Priority>,
    #[serde(default)]
    pub labels: BTreeSet<String>,
}

/// Issue tracker access.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// `Ok(None)` when the ticket does not exist.
    async fn get(&self, id: &str) -> Result<Option<Ticket>, TrackerError>;

    async fn update(&self, id: &str, update: &TicketUpdate) -> Result<(), TrackerError>;

    async fn search(&self, query: &TicketQuery) -> Result<Vec<Ticket>, TrackerError>;

    /// Returns the new ticket id.
    async fn create(&self, ticket: &NewTicket) -> Result<String, TrackerError>;
}

/// A message for the notification transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Fire-and-forget notification transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError>;
}
