//! Per-priority similarity cutoffs.
//!
//! Scores are similarities in [0, 1] (1 = identical). A profile is only
//! constructible when `duplicate > review` holds for every priority.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::ticket::Priority;

/// Cutoff pair for one priority.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cutoffs {
    /// At or above this similarity the ticket is a DUPLICATE.
    pub duplicate: f64,
    /// At or above this similarity (and below `duplicate`) it needs REVIEW.
    pub review: f64,
}

impl Cutoffs {
    pub const fn new(duplicate: f64, review: f64) -> Self {
        Self { duplicate, review }
    }

    fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.duplicate)
            && (0.0..=1.0).contains(&self.review)
            && self.duplicate > self.review
    }
}

/// Validated lookup table `Priority → Cutoffs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "BTreeMap<String, Cutoffs>")]
pub struct ThresholdProfile {
    show_stopper: Cutoffs,
    urgent: Cutoffs,
    high: Cutoffs,
    medium: Cutoffs,
    low: Cutoffs,
}

impl ThresholdProfile {
    /// Build a profile from an explicit cutoff function, rejecting any
    /// priority whose pair is out of range or not strictly ordered.
    pub fn new(cutoffs: impl Fn(Priority) -> Cutoffs) -> Result<Self, ConfigError> {
        let profile = Self {
            show_stopper: cutoffs(Priority::ShowStopper),
            urgent: cutoffs(Priority::Urgent),
            high: cutoffs(Priority::High),
            medium: cutoffs(Priority::Medium),
            low: cutoffs(Priority::Low),
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Build from a partial table keyed by priority name; missing
    /// priorities take the default cutoffs.
    pub fn from_table(table: &BTreeMap<String, Cutoffs>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut overrides: BTreeMap<Priority, Cutoffs> = BTreeMap::new();
        for (name, cutoffs) in table {
            let priority =
                Priority::parse(name).ok_or_else(|| ConfigError::UnknownPriority(name.clone()))?;
            overrides.insert(priority, *cutoffs);
        }
        Self::new(|p| overrides.get(&p).copied().unwrap_or_else(|| defaults.get(p)))
    }

    pub fn get(&self, priority: Priority) -> Cutoffs {
        match priority {
            Priority::ShowStopper => self.show_stopper,
            Priority::Urgent => self.urgent,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }

    pub fn duplicate_cutoff(&self, priority: Priority) -> f64 {
        self.get(priority).duplicate
    }

    pub fn review_cutoff(&self, priority: Priority) -> f64 {
        self.get(priority).review
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for priority in Priority::ALL {
            let c = self.get(priority);
            if !c.is_valid() {
                return Err(ConfigError::InvalidThresholds {
                    priority: priority.to_string(),
                    duplicate: c.duplicate,
                    review: c.review,
                });
            }
        }
        Ok(())
    }
}

impl Default for ThresholdProfile {
    fn default() -> Self {
        Self {
            show_stopper: Cutoffs::new(0.92, 0.80),
            urgent: Cutoffs::new(0.91, 0.79),
            high: Cutoffs::new(0.90, 0.78),
            medium: Cutoffs::new(0.85, 0.70),
            low: Cutoffs::new(0.80, 0.65),
        }
    }
}

impl From<ThresholdProfile> for BTreeMap<String, Cutoffs> {
    fn from(profile: ThresholdProfile) -> Self {
        Priority::ALL
            .iter()
            .map(|p| (p.to_string(), profile.get(*p)))
            .collect()
    }
}
