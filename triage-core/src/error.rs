//! Triage error taxonomy with retry classification.
//!
//! One error type per external collaborator, plus the umbrella
//! [`TriageError`] returned by workflow entry points. Callers ask
//! `is_retryable()` instead of matching on message text.
//!
//! | Error                  | Effect on the unit of work                 |
//! |------------------------|--------------------------------------------|
//! | DocumentLoadError      | that document is skipped                   |
//! | EmbeddingError         | ticket aborted, no tracker mutation        |
//! | SimilarityStoreError   | ticket aborted, no tracker mutation        |
//! | TrackerError           | transient: retried by the bridge; else fail |
//! | NotificationError      | logged, never reverses a classification    |
//! | ConfigError            | startup refused                            |

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A requirement document could not be read or decoded.
#[derive(Debug, Error)]
pub enum DocumentLoadError {
    #[error("failed to read document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// A heading style whose level could not be parsed.
///
/// Never surfaced to callers: the extractor degrades to a level-1 reset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable heading level in style {style:?}")]
pub struct SectionExtractionError {
    pub style: String,
}

/// The embedding service failed to produce a vector.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding response invalid: {0}")]
    InvalidResponse(String),

    #[error("embedding input is empty")]
    EmptyInput,
}

/// The similarity store rejected a query or upsert.
#[derive(Debug, Error)]
pub enum SimilarityStoreError {
    #[error("similarity store request failed: {0}")]
    Request(String),

    #[error("similarity store response invalid: {0}")]
    InvalidResponse(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// How a tracker failure should be treated by the retry layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerErrorKind {
    /// Network failure, timeout, or 5xx. Retried with backoff.
    Transient,
    /// 4xx or validation failure. Not retried.
    Rejected,
    /// The ticket does not exist.
    NotFound,
    /// The tracker answered but the body could not be decoded.
    InvalidResponse,
    /// A non-idempotent request failed after it may have reached the
    /// tracker. Not retried; the write may or may not have been applied.
    Unconfirmed,
}

impl TrackerErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

impl fmt::Display for TrackerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Rejected => write!(f, "rejected"),
            Self::NotFound => write!(f, "not_found"),
            Self::InvalidResponse => write!(f, "invalid_response"),
            Self::Unconfirmed => write!(f, "unconfirmed"),
        }
    }
}

/// Issue tracker failure with its retry classification.
#[derive(Debug, Clone, Error)]
#[error("tracker error [{kind}]: {detail}")]
pub struct TrackerError {
    pub kind: TrackerErrorKind,
    pub detail: String,
}

impl TrackerError {
    pub fn new(kind: TrackerErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn transient(detail: impl Into<String>) -> Self {
        Self::new(TrackerErrorKind::Transient, detail)
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self::new(TrackerErrorKind::Rejected, detail)
    }

    /// Classify an HTTP status code returned by the tracker.
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            404 => TrackerErrorKind::NotFound,
            429 | 500..=599 => TrackerErrorKind::Transient,
            _ => TrackerErrorKind::Rejected,
        };
        Self::new(kind, format!("HTTP {status}: {body}"))
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// The notification transport failed. Always non-fatal.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification transport failed: {0}")]
    Transport(String),

    #[error("no recipient configured")]
    MissingRecipient,
}

/// Configuration could not be loaded or violates an invariant.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(
        "invalid thresholds for {priority}: duplicate cutoff {duplicate} must exceed review cutoff {review}, both within [0, 1]"
    )]
    InvalidThresholds {
        priority: String,
        duplicate: f64,
        review: f64,
    },

    #[error("unknown priority in threshold table: {0}")]
    UnknownPriority(String),

    #[error("target path set contains an empty path")]
    EmptyTargetPath,

    #[error("escalation window must be between 1 and {max} hours")]
    InvalidEscalationWindow { max: u64 },

    #[error("top_k must be at least 1")]
    InvalidTopK,
}

/// Failure of a single triage unit of work.
#[derive(Debug, Error)]
pub enum TriageError {
    #[error("ticket {0} not found")]
    TicketNotFound(String),

    #[error("ticket {0} is already being classified")]
    AlreadyInFlight(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    SimilarityStore(#[from] SimilarityStoreError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

impl TriageError {
    /// Whether an external retry of the whole unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TicketNotFound(_) => false,
            Self::AlreadyInFlight(_) => true,
            Self::Embedding(_) | Self::SimilarityStore(_) => true,
            Self::Tracker(e) => e.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_status_classification() {
        assert_eq!(
            TrackerError::from_status(503, "down").kind,
            TrackerErrorKind::Transient
        );
        assert_eq!(
            TrackerError::from_status(429, "slow down").kind,
            TrackerErrorKind::Transient
        );
        assert_eq!(
            TrackerError::from_status(400, "bad field").kind,
            TrackerErrorKind::Rejected
        );
        assert_eq!(
            TrackerError::from_status(404, "").kind,
            TrackerErrorKind::NotFound
        );
    }

    #[test]
    fn test_tracker_retryable() {
        assert!(TrackerError::transient("timeout").is_retryable());
        assert!(!TrackerError::rejected("400").is_retryable());
        assert!(!TrackerError::new(TrackerErrorKind::NotFound, "x").is_retryable());
        assert!(!TrackerError::new(TrackerErrorKind::Unconfirmed, "timeout").is_retryable());
    }

    #[test]
    fn test_tracker_error_display() {
        let err = TrackerError::from_status(502, "bad gateway");
        let display = err.to_string();
        assert!(display.contains("transient"));
        assert!(display.contains("HTTP 502"));
    }

    #[test]
    fn test_triage_error_retryable() {
        assert!(TriageError::Embedding(EmbeddingError::Request("x".into())).is_retryable());
        assert!(!TriageError::TicketNotFound("AWR-1".into()).is_retryable());
        assert!(!TriageError::Tracker(TrackerError::rejected("no")).is_retryable());
    }

    #[test]
    fn test_kind_serde() {
        let json = serde_json::to_string(&TrackerErrorKind::InvalidResponse).unwrap();
        assert_eq!(json, "\"invalid_response\"");
    }
}
