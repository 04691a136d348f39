//! AWR Triage Core
//!
//! Deterministic building blocks for routing incoming AWR tickets:
//! - Section extraction: turns a styled paragraph stream into a filtered,
//!   path-addressed section tree and flattens it into embedding input
//! - Threshold profiles: per-priority similarity cutoffs
//! - Triage classification: NEW / REVIEW / DUPLICATE decision plus the
//!   side-effect plan that goes with it
//! - Escalation sweep: stale REVIEW tickets move to ESCALATED
//!
//! External services (embedding model, vector store, issue tracker,
//! notification transport) are reached only through the traits in [`ports`].
//!
//! # Flow
//!
//! ```text
//! document ──► sections::extract ──► sections::flatten ──► embedding input
//!
//! ticket ──► Embedder ──► SimilarityStore::query ──► triage::classify
//!                                                        │
//!        IssueTracker::update ◄── TriagePlan ────────────┘
//!        SimilarityStore::upsert (NEW only)
//!        Notifier::send
//!
//! EscalationScheduler::sweep ──► IssueTracker::search / update
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod batch;
pub mod config;
pub mod error;
pub mod escalation;
pub mod in_memory;
pub mod ports;
pub mod retry;
pub mod sections;
pub mod thresholds;
pub mod ticket;
pub mod triage;

pub use batch::{BatchReport, BatchRunner, TicketResult};
pub use config::TriageConfig;
pub use error::{
    ConfigError, DocumentLoadError, EmbeddingError, NotificationError, SimilarityStoreError,
    TrackerError, TrackerErrorKind, TriageError,
};
pub use escalation::{EscalationScheduler, SweepReport, TriageState};
pub use ports::{
    Embedder, IndexEntry, IssueTracker, NewTicket, Notification, Notifier, SimilarityHit,
    SimilarityStore, TicketQuery, TicketUpdate,
};
pub use retry::{RetryOutcome, RetryPolicy, Retryable};
pub use sections::{extract_sections, flatten, FlatSections, Paragraph, SectionNode, TargetPathSet};
pub use thresholds::{Cutoffs, ThresholdProfile};
pub use ticket::{labels, Priority, Ticket};
pub use triage::{classify, Classification, SimilarityMatch, TriageOutcome, TriagePlan, TriageWorkflow};
