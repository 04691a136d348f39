//! Batch driver: classify many tickets with bounded concurrency.
//!
//! Ids are deduplicated before dispatch, and the workflow's in-flight guard
//! keeps overlapping batches from classifying the same ticket twice. One
//! ticket failing never stops the batch.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::TrackerError;
use crate::ports::TicketQuery;
use crate::triage::{Classification, TriageOutcome, TriageWorkflow};

/// Per-ticket line of a [`BatchReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketResult {
    pub ticket_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TriageOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Re-running this ticket later may succeed.
    #[serde(default)]
    pub retryable: bool,
}

impl TicketResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Count per classification label.
    pub classifications: BTreeMap<String, usize>,
    /// Input order.
    pub results: Vec<TicketResult>,
}

impl BatchReport {
    fn from_results(results: Vec<TicketResult>) -> Self {
        let mut report = BatchReport {
            total: results.len(),
            ..BatchReport::default()
        };
        for r in &results {
            match (&r.outcome, &r.error) {
                (_, Some(_)) => report.failed += 1,
                (Some(o), None) if o.skipped => report.skipped += 1,
                (Some(o), None) => {
                    report.succeeded += 1;
                    if let Some(c) = o.classification {
                        *report.classifications.entry(c.to_string()).or_default() += 1;
                    }
                }
                (None, None) => {}
            }
        }
        report.results = results;
        report
    }

    pub fn count(&self, classification: Classification) -> usize {
        self.classifications
            .get(&classification.to_string())
            .copied()
            .unwrap_or(0)
    }

    /// Failed ids whose errors are retryable.
    pub fn retryable_failures(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.is_success() && r.retryable)
            .map(|r| r.ticket_id.as_str())
            .collect()
    }
}

pub struct BatchRunner {
    workflow: Arc<TriageWorkflow>,
    concurrency: usize,
}

impl BatchRunner {
    /// Concurrency comes from the workflow's config.
    pub fn new(workflow: Arc<TriageWorkflow>) -> Self {
        let concurrency = workflow.config().batch_concurrency;
        Self::with_concurrency(workflow, concurrency)
    }

    pub fn with_concurrency(workflow: Arc<TriageWorkflow>, concurrency: usize) -> Self {
        Self {
            workflow,
            concurrency: concurrency.max(1),
        }
    }

    /// Ticket ids selected by `query`.
    pub async fn select(&self, query: &TicketQuery) -> Result<Vec<String>, TrackerError> {
        let tickets = self.workflow.tracker().search(query).await?;
        Ok(tickets.into_iter().map(|t| t.id).collect())
    }

    /// Process `ids`; duplicates after the first occurrence are dropped.
    pub async fn run<I>(&self, ids: I) -> BatchReport
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let ids: Vec<String> = ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        info!(tickets = ids.len(), concurrency = self.concurrency, "Starting batch");

        let mut indexed: Vec<(usize, TicketResult)> = stream::iter(ids.into_iter().enumerate())
            .map(|(pos, id)| {
                let workflow = Arc::clone(&self.workflow);
                async move {
                    let result = match workflow.process(&id).await {
                        Ok(outcome) => TicketResult {
                            ticket_id: id,
                            outcome: Some(outcome),
                            error: None,
                            retryable: false,
                        },
                        Err(e) => {
                            warn!(ticket = %id, error = %e, "Ticket failed in batch");
                            TicketResult {
                                retryable: e.is_retryable(),
                                error: Some(e.to_string()),
                                ticket_id: id,
                                outcome: None,
                            }
                        }
                    };
                    (pos, result)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        indexed.sort_by_key(|(pos, _)| *pos);
        let report = BatchReport::from_results(indexed.into_iter().map(|(_, r)| r).collect());
        info!(
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            "Batch complete"
        );
        report
    }
}
