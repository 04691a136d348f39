//! Tracing setup and the JSONL run log.
//!
//! Every state-mutating command appends one [`RunRecord`] line. Appends never
//! fail the command; a broken log file only produces a warning.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use triage_core::{BatchReport, SweepReport};

/// Install the global subscriber. `RUST_LOG` wins; default level is `info`.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// One CLI invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub succeeded: usize,
    #[serde(default)]
    pub skipped: usize,
    pub failed: usize,
    #[serde(default)]
    pub classifications: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl RunRecord {
    pub fn new(command: &str, started_at: DateTime<Utc>) -> Self {
        let elapsed_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        Self {
            run_id: format!("{command}-{}", started_at.format("%Y%m%dT%H%M%S%.3fZ")),
            command: command.to_string(),
            started_at,
            elapsed_ms,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            classifications: BTreeMap::new(),
            detail: serde_json::Value::Null,
        }
    }

    pub fn from_batch(command: &str, started_at: DateTime<Utc>, report: &BatchReport) -> Self {
        Self {
            succeeded: report.succeeded,
            skipped: report.skipped,
            failed: report.failed,
            classifications: report.classifications.clone(),
            ..Self::new(command, started_at)
        }
    }

    pub fn from_sweep(started_at: DateTime<Utc>, report: &SweepReport) -> Self {
        let mut classifications = BTreeMap::new();
        if !report.escalated.is_empty() {
            classifications.insert("ESCALATED".to_string(), report.escalated.len());
        }
        Self {
            succeeded: report.escalated.len(),
            skipped: report.skipped.len(),
            failed: report.failed.len(),
            classifications,
            ..Self::new("escalate", started_at)
        }
    }

    pub fn with_counts(mut self, succeeded: usize, failed: usize) -> Self {
        self.succeeded = succeeded;
        self.failed = failed;
        self
    }

    pub fn with_detail(mut self, detail: impl Serialize) -> Self {
        self.detail = serde_json::to_value(detail).unwrap_or(serde_json::Value::Null);
        self
    }
}

/// Append `record` as one JSON line.
pub fn append_run_record(record: &RunRecord, path: &Path) {
    match serde_json::to_string(record) {
        Ok(json) => {
            use std::io::Write;
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        warn!("Failed to append run record: {e}");
                    } else {
                        info!(path = %path.display(), run_id = %record.run_id, "Appended run record");
                    }
                }
                Err(e) => warn!("Failed to open run log: {e}"),
            }
        }
        Err(e) => warn!("Failed to serialize run record: {e}"),
    }
}

/// Aggregate over a run log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub runs: usize,
    pub tickets_processed: usize,
    pub failures: usize,
    pub classifications: BTreeMap<String, usize>,
    pub last_run: Option<DateTime<Utc>>,
}

/// Reads run records back from a JSONL file.
pub struct RunLogReader {
    records: Vec<RunRecord>,
}

impl RunLogReader {
    pub fn read_from_file(path: &Path) -> std::io::Result<Self> {
        use std::fs::File;
        use std::io::{BufRead, BufReader};

        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: RunRecord = serde_json::from_str(&line)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            records.push(record);
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[RunRecord] {
        &self.records
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            runs: self.records.len(),
            ..Default::default()
        };
        for r in &self.records {
            summary.tickets_processed += r.succeeded + r.skipped + r.failed;
            summary.failures += r.failed;
            for (label, n) in &r.classifications {
                *summary.classifications.entry(label.clone()).or_default() += n;
            }
            summary.last_run = summary.last_run.max(Some(r.started_at));
        }
        summary
    }
}
