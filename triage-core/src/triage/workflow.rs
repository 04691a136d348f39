//! Triage Workflow: fetch, embed, query, classify, apply
//!
//! Applies a [`TriagePlan`] in a fixed order: tracker update, then the index
//! upsert (NEW only), then the notification. A failure before the tracker
//! write leaves the ticket untouched; a failure after it leaves a correctly
//! labelled ticket that may be unindexed or un-notified, and the outcome says
//! which. Reprocessing a NEW ticket restores a missing index entry without
//! touching the tracker.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::TriageConfig;
use crate::error::TriageError;
use crate::escalation::TriageState;
use crate::ports::{Embedder, IndexEntry, IssueTracker, Notifier, SimilarityStore};
use crate::ticket::Ticket;
use crate::triage::classifier::{classify, index_plan, Classification, SimilarityMatch};

/// Result of processing one ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageOutcome {
    pub ticket_id: String,
    /// `None` when the ticket was skipped.
    pub classification: Option<Classification>,
    /// Ticket already carried a triage label; nothing was written.
    pub skipped: bool,
    /// Best candidate considered, if the store returned one.
    pub matched: Option<SimilarityMatch>,
    pub similarity: Option<f64>,
    /// The ticket's embedding was written to the index. On a skipped NEW
    /// ticket this means a missing entry was restored.
    pub indexed: bool,
    /// A notification was delivered.
    pub notified: bool,
    /// Non-fatal failures after the tracker write.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl TriageOutcome {
    fn skipped(ticket_id: &str) -> Self {
        Self {
            ticket_id: ticket_id.to_string(),
            classification: None,
            skipped: true,
            matched: None,
            similarity: None,
            indexed: false,
            notified: false,
            warnings: Vec::new(),
        }
    }
}

/// Owns the collaborators and the per-ticket in-flight guard.
pub struct TriageWorkflow {
    tracker: Arc<dyn IssueTracker>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn SimilarityStore>,
    notifier: Arc<dyn Notifier>,
    config: Arc<TriageConfig>,
    in_flight: Mutex<HashSet<String>>,
}

/// Releases a ticket id from the in-flight set on drop.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.id);
    }
}

fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TriageWorkflow {
    pub fn new(
        tracker: Arc<dyn IssueTracker>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn SimilarityStore>,
        notifier: Arc<dyn Notifier>,
        config: Arc<TriageConfig>,
    ) -> Self {
        Self {
            tracker,
            embedder,
            store,
            notifier,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<dyn IssueTracker> {
        &self.tracker
    }

    fn acquire(&self, ticket_id: &str) -> Result<InFlightGuard<'_>, TriageError> {
        let mut set = lock(&self.in_flight);
        if !set.insert(ticket_id.to_string()) {
            return Err(TriageError::AlreadyInFlight(ticket_id.to_string()));
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            id: ticket_id.to_string(),
        })
    }

    /// Classify one ticket and apply the resulting side effects.
    pub async fn process(&self, ticket_id: &str) -> Result<TriageOutcome, TriageError> {
        let _guard = self.acquire(ticket_id)?;

        let ticket = self
            .tracker
            .get(ticket_id)
            .await?
            .ok_or_else(|| TriageError::TicketNotFound(ticket_id.to_string()))?;

        match TriageState::of(&ticket) {
            TriageState::Unclassified => {}
            TriageState::New => return self.ensure_indexed(&ticket).await,
            state => {
                info!(ticket = %ticket.id, %state, "Ticket already triaged, skipping");
                return Ok(TriageOutcome::skipped(&ticket.id));
            }
        }

        // Read-only stages: any failure here aborts with no tracker mutation.
        let text = ticket.embedding_text();
        let embedding = self.embedder.embed(&text).await.map_err(|e| {
            error!(ticket = %ticket.id, error = %e, "Embedding failed, ticket left unclassified");
            e
        })?;
        let hits = self
            .store
            .query(&embedding, self.config.top_k.saturating_add(1))
            .await
            .map_err(|e| {
                error!(ticket = %ticket.id, error = %e, "Similarity query failed, ticket left unclassified");
                e
            })?;

        let matched = SimilarityMatch::best_of(&hits, &ticket.id);
        debug!(
            ticket = %ticket.id,
            hits = hits.len(),
            best = ?matched.as_ref().map(|m| (&m.candidate_id, m.similarity)),
            "Similarity query complete"
        );

        let (classification, plan) = classify(&ticket, matched.as_ref(), &self.config);

        self.tracker.update(&ticket.id, &plan.update).await.map_err(|e| {
            error!(ticket = %ticket.id, %classification, error = %e, "Tracker update failed");
            e
        })?;
        info!(
            ticket = %ticket.id,
            %classification,
            priority = %ticket.priority,
            similarity = ?matched.as_ref().map(|m| m.similarity),
            "Ticket classified"
        );

        let mut outcome = TriageOutcome {
            ticket_id: ticket.id.clone(),
            classification: Some(classification),
            skipped: false,
            similarity: matched.as_ref().map(|m| m.similarity),
            matched,
            indexed: false,
            notified: false,
            warnings: Vec::new(),
        };

        if let Some(index) = plan.index {
            let entry = IndexEntry {
                id: ticket.id.clone(),
                embedding,
                document: index.document,
                metadata: index.metadata,
            };
            match self.store.upsert(entry).await {
                Ok(()) => {
                    outcome.indexed = true;
                    debug!(ticket = %ticket.id, "Ticket indexed");
                }
                Err(e) => {
                    warn!(ticket = %ticket.id, error = %e, "Index upsert failed; ticket labelled but unindexed");
                    outcome.warnings.push(format!("index upsert failed: {e}"));
                }
            }
        }

        if let Some(notification) = plan.notification {
            match self.notifier.send(&notification).await {
                Ok(()) => outcome.notified = true,
                Err(e) => {
                    warn!(ticket = %ticket.id, error = %e, "Notification failed");
                    outcome.warnings.push(format!("notification failed: {e}"));
                }
            }
        }

        Ok(outcome)
    }

    /// Upsert a NEW ticket's entry if the store lacks it. No classification,
    /// no tracker write, no notification.
    async fn ensure_indexed(&self, ticket: &Ticket) -> Result<TriageOutcome, TriageError> {
        let mut outcome = TriageOutcome::skipped(&ticket.id);
        if self.store.contains(&ticket.id).await? {
            debug!(ticket = %ticket.id, "NEW ticket already indexed, skipping");
            return Ok(outcome);
        }
        let index = index_plan(ticket);
        let embedding = self.embedder.embed(&index.document).await?;
        self.store
            .upsert(IndexEntry {
                id: ticket.id.clone(),
                embedding,
                document: index.document,
                metadata: index.metadata,
            })
            .await
            .map_err(|e| {
                error!(ticket = %ticket.id, error = %e, "Reindex of NEW ticket failed");
                e
            })?;
        info!(ticket = %ticket.id, "Restored missing index entry for NEW ticket");
        outcome.indexed = true;
        Ok(outcome)
    }
}
