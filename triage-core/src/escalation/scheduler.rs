//! Escalation Scheduler: moves stale REVIEW tickets to ESCALATED
//!
//! A sweep queries the tracker for `AI_REVIEW` tickets last updated before
//! `now − window`, re-checks each one locally, swaps the label, comments
//! and notifies. Per-ticket failures are logged and the sweep moves on.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::TriageConfig;
use crate::error::TrackerError;
use crate::escalation::lifecycle::TriageState;
use crate::ports::{IssueTracker, Notification, Notifier, TicketQuery};
use crate::ticket::{labels, Ticket};

/// Per-sweep accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    /// When the sweep ran.
    pub swept_at: Option<DateTime<Utc>>,
    /// Tickets that were escalated, in query order.
    pub escalated: Vec<String>,
    /// Returned by the query but not stale or not in REVIEW on re-check.
    pub skipped: Vec<String>,
    /// Tracker update failures, `(ticket, error)`.
    pub failed: Vec<(String, String)>,
    /// Escalations whose notification could not be sent.
    pub notify_failures: usize,
}

pub struct EscalationScheduler {
    tracker: Arc<dyn IssueTracker>,
    notifier: Arc<dyn Notifier>,
    config: Arc<TriageConfig>,
}

impl EscalationScheduler {
    pub fn new(
        tracker: Arc<dyn IssueTracker>,
        notifier: Arc<dyn Notifier>,
        config: Arc<TriageConfig>,
    ) -> Self {
        Self {
            tracker,
            notifier,
            config,
        }
    }

    /// Latest `updated` timestamp that still counts as stale at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.config.escalation_window())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Escalate stale REVIEW tickets; returns the escalated ids.
    ///
    /// Fails only if the tracker search itself fails.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<String>, TrackerError> {
        Ok(self.sweep_report(now).await?.escalated)
    }

    pub async fn sweep_report(&self, now: DateTime<Utc>) -> Result<SweepReport, TrackerError> {
        let cutoff = self.cutoff(now);
        let query = TicketQuery::StaleWithLabel {
            label: labels::AI_REVIEW.to_string(),
            updated_before: cutoff,
        };
        debug!(%cutoff, "Querying stale REVIEW tickets");
        let candidates = self.tracker.search(&query).await.map_err(|e| {
            error!(error = %e, "Escalation query failed");
            e
        })?;

        let mut report = SweepReport {
            swept_at: Some(now),
            ..SweepReport::default()
        };

        for ticket in candidates {
            if !self.is_stale(&ticket, cutoff) {
                debug!(ticket = %ticket.id, updated = %ticket.updated, "Not stale on re-check, skipping");
                report.skipped.push(ticket.id);
                continue;
            }

            let idle_hours = (now - ticket.updated).num_hours();
            let update = TriageState::escalation_update().with_comment(format!(
                "Auto-escalated after {}h inactivity (window {}h)",
                idle_hours, self.config.escalation_window_hours
            ));

            if let Err(e) = self.tracker.update(&ticket.id, &update).await {
                warn!(ticket = %ticket.id, error = %e, "Escalation update failed");
                report.failed.push((ticket.id, e.to_string()));
                continue;
            }
            info!(ticket = %ticket.id, idle_hours, "Ticket escalated");

            if let Err(e) = self.notifier.send(&self.notification(&ticket, idle_hours)).await {
                warn!(ticket = %ticket.id, error = %e, "Escalation notification failed");
                report.notify_failures += 1;
            }
            report.escalated.push(ticket.id);
        }

        info!(
            escalated = report.escalated.len(),
            failed = report.failed.len(),
            "Escalation sweep complete"
        );
        Ok(report)
    }

    /// Sweep every `period` until `shutdown` resolves.
    pub async fn run_periodic<S>(&self, period: Duration, shutdown: S) -> Vec<SweepReport>
    where
        S: Future<Output = ()>,
    {
        let mut reports = Vec::new();
        let mut ticker = tokio::time::interval(period);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(sweeps = reports.len(), "Escalation watch stopped");
                    return reports;
                }
                _ = ticker.tick() => {
                    match self.sweep_report(Utc::now()).await {
                        Ok(report) => reports.push(report),
                        Err(e) => error!(error = %e, "Escalation sweep failed, will retry next tick"),
                    }
                }
            }
        }
    }

    fn is_stale(&self, ticket: &Ticket, cutoff: DateTime<Utc>) -> bool {
        TriageState::of(ticket) == TriageState::Review && ticket.updated < cutoff
    }

    fn notification(&self, ticket: &Ticket, idle_hours: i64) -> Notification {
        Notification {
            recipient: self.config.recipient.clone(),
            subject: format!("[Escalation] {} needs attention", ticket.id),
            body: format!(
                "Ticket {} ({}) has been in review for {}h without activity and was escalated.\nPriority: {}",
                ticket.id, ticket.summary, idle_hours, ticket.priority
            ),
        }
    }
}
