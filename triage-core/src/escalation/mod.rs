//! Escalation: Triage lifecycle and the stale-REVIEW sweep
//!
//! The lifecycle is read off a ticket's labels; nothing else is persisted.
//!
//! ```text
//!                classify()              sweep() after window, no update
//! Unclassified ──────────────► Review ─────────────────────────────► Escalated
//!      │                                                             (terminal)
//!      ├─────────────────────► Duplicate (terminal, pending closure)
//!      └─────────────────────► New (terminal for this pass)
//! ```

pub mod lifecycle;
pub mod scheduler;

pub use lifecycle::TriageState;
pub use scheduler::{EscalationScheduler, SweepReport};
