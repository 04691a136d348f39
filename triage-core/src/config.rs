//! Triage configuration: constructed once at startup, then passed by reference.
//!
//! Loaded from TOML. Every field is optional in the file; omitted fields take
//! the defaults below. Invalid threshold pairs are rejected here, never
//! tolerated at classification time.
//!
//! ```toml
//! recipient = "awr-ops@example.com"
//! escalation_window_hours = 24
//! top_k = 3
//! target_paths = [
//!     ["customer requirements details", "functional requirements"],
//! ]
//!
//! [thresholds.HIGH]
//! duplicate = 0.90
//! review = 0.78
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sections::{TargetPathSet, DEFAULT_SEPARATOR};
use crate::thresholds::{Cutoffs, ThresholdProfile};

const DEFAULT_ESCALATION_HOURS: u64 = 24;
const DEFAULT_TOP_K: usize = 3;
const DEFAULT_BATCH_CONCURRENCY: usize = 4;
/// Ten years.
pub const MAX_ESCALATION_WINDOW_HOURS: u64 = 24 * 365 * 10;

/// On-disk shape; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTriageConfig {
    recipient: Option<String>,
    escalation_window_hours: Option<u64>,
    top_k: Option<usize>,
    section_separator: Option<String>,
    batch_concurrency: Option<usize>,
    #[serde(default)]
    thresholds: BTreeMap<String, Cutoffs>,
    target_paths: Option<TargetPathSet>,
}

/// Validated triage configuration.
#[derive(Debug, Clone, Serialize)]
pub struct TriageConfig {
    pub thresholds: ThresholdProfile,
    pub target_paths: TargetPathSet,
    /// Hours without activity before a REVIEW ticket is escalated.
    pub escalation_window_hours: u64,
    /// Operational recipient for DUPLICATE/REVIEW/ESCALATED notices.
    pub recipient: String,
    /// Neighbours requested per similarity query.
    pub top_k: usize,
    pub section_separator: String,
    /// Tickets classified concurrently by a batch run.
    pub batch_concurrency: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdProfile::default(),
            target_paths: TargetPathSet::default(),
            escalation_window_hours: DEFAULT_ESCALATION_HOURS,
            recipient: String::new(),
            top_k: DEFAULT_TOP_K,
            section_separator: DEFAULT_SEPARATOR.to_string(),
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl TriageConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawTriageConfig = toml::from_str(content)?;
        let defaults = Self::default();

        let config = Self {
            thresholds: ThresholdProfile::from_table(&raw.thresholds)?,
            target_paths: raw.target_paths.unwrap_or(defaults.target_paths),
            escalation_window_hours: raw
                .escalation_window_hours
                .unwrap_or(defaults.escalation_window_hours),
            recipient: raw.recipient.unwrap_or(defaults.recipient),
            top_k: raw.top_k.unwrap_or(defaults.top_k),
            section_separator: raw.section_separator.unwrap_or(defaults.section_separator),
            batch_concurrency: raw
                .batch_concurrency
                .unwrap_or(defaults.batch_concurrency)
                .max(1),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Builder-style recipient override.
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = recipient.into();
        self
    }

    pub fn escalation_window(&self) -> chrono::Duration {
        let hours = self.escalation_window_hours.min(MAX_ESCALATION_WINDOW_HOURS);
        chrono::Duration::hours(hours as i64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_ESCALATION_WINDOW_HOURS).contains(&self.escalation_window_hours) {
            return Err(ConfigError::InvalidEscalationWindow {
                max: MAX_ESCALATION_WINDOW_HOURS,
            });
        }
        if self.top_k == 0 {
            return Err(ConfigError::InvalidTopK);
        }
        if self.target_paths.has_empty_path() {
            return Err(ConfigError::EmptyTargetPath);
        }
        Ok(())
    }
}
