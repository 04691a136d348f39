//! Retry policy for transient collaborator failures.
//!
//! Boundary adapters wrap their calls in [`RetryPolicy::run`]; the decision
//! logic never retries on its own. Only errors reporting
//! [`Retryable::is_retryable`] are retried.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{TrackerError, TriageError};

/// Errors that know whether another attempt may succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for TrackerError {
    fn is_retryable(&self) -> bool {
        TrackerError::is_retryable(self)
    }
}

impl Retryable for TriageError {
    fn is_retryable(&self) -> bool {
        TriageError::is_retryable(self)
    }
}

/// Exponential backoff with a cap and symmetric jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first (minimum 1).
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Maximum backoff delay in milliseconds, before jitter.
    pub max_backoff_ms: u64,
    /// Fraction of the delay added or removed at random, in [0, 1].
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    /// Default: 4 attempts, 500ms initial backoff, 2x multiplier, 8s max, ±20% jitter.
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 8_000,
            jitter_ratio: 0.2,
        }
    }
}

/// Tagged result of a retried operation.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Succeeded { value, .. } => Ok(value),
            Self::Failed { error, .. } => Err(error),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no delay.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Un-jittered delay before `attempt` (0-indexed; attempt 0 has no delay).
    pub fn base_backoff_ms(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let delay =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32 - 1);
        (delay as u64).min(self.max_backoff_ms)
    }

    /// Jittered delay before `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_backoff_ms(attempt) as f64;
        let ratio = self.jitter_ratio.clamp(0.0, 1.0);
        if base == 0.0 || ratio == 0.0 {
            return Duration::from_millis(base as u64);
        }
        let spread = base * ratio;
        let jitter = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis((base + jitter).max(0.0) as u64)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget runs out. `op` receives the 0-indexed attempt number.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> RetryOutcome<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
            match op(attempt).await {
                Ok(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt + 1,
                    }
                }
                Err(error) => {
                    let attempts = attempt + 1;
                    if !error.is_retryable() || attempts >= max_attempts {
                        return RetryOutcome::Failed { error, attempts };
                    }
                    warn!(op = label, attempt = attempts, error = %error, "Transient failure, retrying");
                    attempt += 1;
                }
            }
        }
    }
}
