//! Triage lifecycle derived from labels.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ports::TicketUpdate;
use crate::ticket::{labels, Ticket};

/// Where a ticket sits in the triage lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageState {
    Unclassified,
    New,
    Review,
    Duplicate,
    Escalated,
}

impl TriageState {
    /// Read the state from a ticket's labels.
    ///
    /// ESCALATED wins over any leftover classification label, then
    /// DUPLICATE, REVIEW, NEW.
    pub fn of(ticket: &Ticket) -> Self {
        if ticket.has_label(labels::ESCALATED) {
            Self::Escalated
        } else if ticket.has_label(labels::AI_DUPLICATE) {
            Self::Duplicate
        } else if ticket.has_label(labels::AI_REVIEW) {
            Self::Review
        } else if ticket.has_label(labels::AI_NEW) {
            Self::New
        } else {
            Self::Unclassified
        }
    }

    /// `Review → Escalated`; `None` from any other state.
    pub fn escalate(self) -> Option<Self> {
        (self == Self::Review).then_some(Self::Escalated)
    }

    /// Label delta for `Review → Escalated`: drop AI_REVIEW, add ESCALATED.
    pub fn escalation_update() -> TicketUpdate {
        TicketUpdate::default()
            .remove_label(labels::AI_REVIEW)
            .add_label(labels::ESCALATED)
    }
}

impl fmt::Display for TriageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unclassified => write!(f, "unclassified"),
            Self::New => write!(f, "new"),
            Self::Review => write!(f, "review"),
            Self::Duplicate => write!(f, "duplicate"),
            Self::Escalated => write!(f, "escalated"),
        }
    }
}
