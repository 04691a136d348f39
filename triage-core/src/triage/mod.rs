//! Triage Classifier: similarity thresholds → disposition → side effects
//!
//! `classify` is pure: it turns a ticket and its best similarity match into
//! a [`Classification`] and a [`TriagePlan`]. [`TriageWorkflow`] owns the
//! collaborators and applies the plan in a fixed order.
//!
//! ```text
//! no match ───────────────────────────────► NEW
//! similarity >= duplicate_cutoff(priority) ► DUPLICATE
//! similarity >= review_cutoff(priority) ───► REVIEW
//! otherwise ───────────────────────────────► NEW
//! ```
//!
//! | Classification | label        | summary marker          | comment | notify | upsert |
//! |----------------|--------------|-------------------------|---------|--------|--------|
//! | DUPLICATE      | AI_DUPLICATE | `[DUPLICATE: <id>]`     | no      | yes    | no     |
//! | REVIEW         | AI_REVIEW    | `[REVIEW NEEDED: <id>]` | yes     | yes    | no     |
//! | NEW            | AI_NEW       | none                    | yes     | no     | yes    |

pub mod classifier;
pub mod workflow;

pub use classifier::{classify, index_plan, Classification, IndexPlan, SimilarityMatch, TriagePlan};
pub use workflow::{TriageOutcome, TriageWorkflow};
