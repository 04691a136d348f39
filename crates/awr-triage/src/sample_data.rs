//! Sample AWR corpus loading.
//!
//! Records come from a JSON array. Each call builds its own accumulator of
//! index entries and hands it to the store in one batch; nothing is kept on
//! a long-lived object between loads.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use triage_core::{
    labels, DocumentLoadError, Embedder, IndexEntry, IssueTracker, NewTicket, SimilarityStore,
    SimilarityStoreError, TicketUpdate,
};

const EMBED_CONCURRENCY: usize = 4;
const MISSING: &str = "N/A";

/// One historical AWR record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleRecord {
    #[serde(rename = "ID", alias = "id")]
    pub id: String,
    #[serde(rename = "JIRA_AWR_Title", alias = "title")]
    pub title: String,
    #[serde(rename = "JIRA_AWR_Description", alias = "description")]
    pub description: String,
    #[serde(rename = "JIRA_AWR_URL", alias = "url")]
    pub url: String,
    #[serde(rename = "AWR_Document_Version")]
    pub document_version: String,
    #[serde(rename = "AWR_Document_Reference")]
    pub document_reference: String,
    #[serde(rename = "AWR_DOC_JIRA_REF")]
    pub jira_ref: String,
    #[serde(rename = "AWR_DOC_Short_Work_Desc")]
    pub short_work_desc: String,
    #[serde(rename = "AWR_DOC_CUST_REQ_Summary")]
    pub customer_request_summary: String,
    #[serde(rename = "AWR_DOC_CUST_REQ_Details")]
    pub customer_request_details: String,
    #[serde(rename = "AWR_DOC_Business_Solution")]
    pub business_solution: String,
    #[serde(rename = "WIKI_PAGE_URL")]
    pub wiki_url: String,
    #[serde(rename = "WIKI_PAGE_Heading")]
    pub wiki_heading: String,
    #[serde(rename = "WIKI_PAGE_Details")]
    pub wiki_details: String,
}

fn or_missing(s: &str) -> &str {
    let t = s.trim();
    if t.is_empty() {
        MISSING
    } else {
        t
    }
}

impl SampleRecord {
    /// A record needs an id or a title to be usable.
    pub fn is_usable(&self) -> bool {
        !self.id.trim().is_empty() || !self.title.trim().is_empty()
    }

    /// `"{title} - {description}"`, or whichever half is present.
    pub fn document_text(&self) -> Option<String> {
        let title = self.title.trim();
        let description = self.description.trim();
        match (title.is_empty(), description.is_empty()) {
            (false, false) => Some(format!("{title} - {description}")),
            (false, true) => Some(title.to_string()),
            (true, false) => Some(description.to_string()),
            (true, true) => None,
        }
    }

    /// Stable index id: blake3 of `"{ID}_{document}"`.
    pub fn index_id(&self, document: &str) -> String {
        blake3::hash(format!("{}_{}", self.id.trim(), document).as_bytes())
            .to_hex()
            .to_string()
    }

    /// Non-empty fields keyed by their source column name.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        [
            ("ID", &self.id),
            ("JIRA_AWR_Title", &self.title),
            ("JIRA_AWR_URL", &self.url),
            ("AWR_Document_Version", &self.document_version),
            ("AWR_Document_Reference", &self.document_reference),
            ("AWR_DOC_JIRA_REF", &self.jira_ref),
            ("AWR_DOC_Short_Work_Desc", &self.short_work_desc),
            ("AWR_DOC_CUST_REQ_Summary", &self.customer_request_summary),
            ("WIKI_PAGE_URL", &self.wiki_url),
            ("WIKI_PAGE_Heading", &self.wiki_heading),
        ]
        .into_iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .map(|(k, v)| (k.to_string(), v.trim().to_string()))
        .collect()
    }

    /// Multi-section ticket description used when seeding the tracker.
    pub fn ticket_description(&self) -> String {
        format!(
            "{}\n\nAWR Document Ref: {}\nVersion: {}\n\nShort Work Desc:\n{}\n\nCustomer Request Summary:\n{}\n\nCustomer Request Details:\n{}\n\nBusiness Solution:\n{}\n\nWiki:\n{} - {}\n{}",
            or_missing(&self.description),
            or_missing(&self.document_reference),
            or_missing(&self.document_version),
            or_missing(&self.short_work_desc),
            or_missing(&self.customer_request_summary),
            or_missing(&self.customer_request_details),
            or_missing(&self.business_solution),
            or_missing(&self.wiki_url),
            or_missing(&self.wiki_heading),
            or_missing(&self.wiki_details),
        )
    }
}

/// Read a JSON array of records, dropping unusable ones.
pub fn load_records(path: &Path) -> Result<Vec<SampleRecord>, DocumentLoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| DocumentLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let records: Vec<SampleRecord> =
        serde_json::from_str(&content).map_err(|e| DocumentLoadError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    let total = records.len();
    let usable: Vec<SampleRecord> = records.into_iter().filter(SampleRecord::is_usable).collect();
    if usable.len() < total {
        warn!(dropped = total - usable.len(), "Dropped records without ID or title");
    }
    Ok(usable)
}

/// Document awaiting embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusEntry {
    pub id: String,
    pub document: String,
    pub metadata: BTreeMap<String, String>,
}

/// Build this load's accumulator; repeated ids keep the first occurrence.
pub fn build_corpus(records: &[SampleRecord]) -> Vec<CorpusEntry> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter_map(|r| {
            let document = r.document_text()?;
            let id = r.index_id(&document);
            seen.insert(id.clone()).then(|| CorpusEntry {
                id,
                metadata: r.metadata(),
                document,
            })
        })
        .collect()
}

/// Outcome of a corpus load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub records: usize,
    pub indexed: usize,
    /// Entries whose embedding failed.
    pub skipped: usize,
    /// Tickets created in the tracker, when requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub created_tickets: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_tickets: Vec<String>,
}

/// Embed every entry and upsert the successes in one batch.
pub async fn index_corpus(
    entries: Vec<CorpusEntry>,
    embedder: &dyn Embedder,
    store: &dyn SimilarityStore,
) -> Result<LoadReport, SimilarityStoreError> {
    let records = entries.len();
    let embedded: Vec<Option<IndexEntry>> = stream::iter(entries)
        .map(|entry| async move {
            match embedder.embed(&entry.document).await {
                Ok(embedding) => Some(IndexEntry {
                    id: entry.id,
                    embedding,
                    document: entry.document,
                    metadata: entry.metadata,
                }),
                Err(e) => {
                    warn!(id = %entry.id, error = %e, "Embedding failed, entry skipped");
                    None
                }
            }
        })
        .buffered(EMBED_CONCURRENCY)
        .collect()
        .await;

    let batch: Vec<IndexEntry> = embedded.into_iter().flatten().collect();
    let skipped = records - batch.len();
    let indexed = store.upsert_batch(batch).await?;
    info!(records, indexed, skipped, "Corpus loaded");
    Ok(LoadReport {
        records,
        indexed,
        skipped,
        ..LoadReport::default()
    })
}

/// Seed the tracker with one ticket per record.
///
/// Returns `(created ids, failed titles)`; one failure does not stop the rest.
pub async fn create_tickets(
    records: &[SampleRecord],
    tracker: &dyn IssueTracker,
) -> (Vec<String>, Vec<String>) {
    let mut created = Vec::new();
    let mut failed = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        let summary = if record.title.trim().is_empty() {
            record.id.trim().to_string()
        } else {
            record.title.trim().to_string()
        };
        let new = NewTicket {
            summary: summary.clone(),
            description: record.ticket_description(),
            priority: None,
            labels: BTreeSet::from([labels::AUTO_LOADED.to_string()]),
        };
        match tracker.create(&new).await {
            Ok(key) => {
                info!(n = idx + 1, ticket = %key, "Created ticket");
                let comment = TicketUpdate::default()
                    .add_label(labels::AUTO_LOADED)
                    .with_comment("Ticket auto-created from sample load.");
                if let Err(e) = tracker.update(&key, &comment).await {
                    warn!(ticket = %key, error = %e, "Failed to annotate created ticket");
                }
                created.push(key);
            }
            Err(e) => {
                warn!(n = idx + 1, summary = %summary, error = %e, "Failed to create ticket");
                failed.push(summary);
            }
        }
    }
    (created, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::in_memory::{HashEmbedder, MemoryStore, MemoryTracker};

    const SAMPLE: &str = r#"[
        {"ID": "1001", "JIRA_AWR_Title": "Portal SSO", "JIRA_AWR_Description": "SAML login",
         "JIRA_AWR_URL": "https://jira/browse/AWR-7", "AWR_DOC_JIRA_REF": "AWR-7"},
        {"ID": "1002", "JIRA_AWR_Title": "Invoice layout"},
        {"ID": "", "JIRA_AWR_Title": ""},
        {"ID": "1001", "JIRA_AWR_Title": "Portal SSO", "JIRA_AWR_Description": "SAML login"}
    ]"#;

    fn write_sample() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, SAMPLE).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_records_drops_unusable() {
        let (_dir, path) = write_sample();
        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].jira_ref, "AWR-7");
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_records(&path), Err(DocumentLoadError::Malformed { .. })));
    }

    #[test]
    fn test_document_text_and_id() {
        let r = SampleRecord {
            id: "1001".into(),
            title: "Portal SSO".into(),
            description: "SAML login".into(),
            ..Default::default()
        };
        let doc = r.document_text().unwrap();
        assert_eq!(doc, "Portal SSO - SAML login");
        assert_eq!(r.index_id(&doc), r.index_id(&doc));
        assert_eq!(r.index_id(&doc).len(), 64);
        assert_ne!(r.index_id(&doc), r.index_id("other"));
    }

    #[test]
    fn test_build_corpus_dedups() {
        let (_dir, path) = write_sample();
        let corpus = build_corpus(&load_records(&path).unwrap());
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus[0].metadata["AWR_DOC_JIRA_REF"], "AWR-7");
        assert!(!corpus[1].metadata.contains_key("JIRA_AWR_URL"));
    }

    #[test]
    fn test_ticket_description_fills_missing() {
        let r = SampleRecord {
            title: "x".into(),
            ..Default::default()
        };
        let d = r.ticket_description();
        assert!(d.starts_with("N/A\n\nAWR Document Ref: N/A"));
        assert!(d.contains("Business Solution:\nN/A"));
    }

    #[tokio::test]
    async fn test_index_corpus_is_idempotent() {
        let (_dir, path) = write_sample();
        let records = load_records(&path).unwrap();
        let store = MemoryStore::new();
        let embedder = HashEmbedder::new(32);

        let report = index_corpus(build_corpus(&records), &embedder, &store).await.unwrap();
        assert_eq!(report.indexed, 2);
        index_corpus(build_corpus(&records), &embedder, &store).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_create_tickets() {
        let (_dir, path) = write_sample();
        let records = load_records(&path).unwrap();
        let tracker = MemoryTracker::new();

        let (created, failed) = create_tickets(&records[..2], &tracker).await;
        assert_eq!(created, vec!["AWR-1".to_string(), "AWR-2".to_string()]);
        assert!(failed.is_empty());
        let t = tracker.snapshot("AWR-1").unwrap();
        assert!(t.has_label(labels::AUTO_LOADED));
        assert_eq!(t.summary, "Portal SSO");
        assert_eq!(tracker.comments("AWR-1"), vec!["Ticket auto-created from sample load.".to_string()]);
    }
}
