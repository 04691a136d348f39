//! Requirement document indexing.
//!
//! A document arrives as a JSON paragraph stream. Target sections are
//! extracted, flattened, embedded one by one and upserted under an id derived
//! from the document id and the section path.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use triage_core::{
    extract_sections, flatten, DocumentLoadError, Embedder, FlatSections, IndexEntry, Paragraph,
    SimilarityStore, SimilarityStoreError, TriageConfig,
};

/// Either a bare paragraph array or `{"paragraphs": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParagraphFile {
    Bare(Vec<Paragraph>),
    Wrapped { paragraphs: Vec<Paragraph> },
}

pub fn load_paragraphs(path: &Path) -> Result<Vec<Paragraph>, DocumentLoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| DocumentLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: ParagraphFile =
        serde_json::from_str(&content).map_err(|e| DocumentLoadError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(match parsed {
        ParagraphFile::Bare(p) | ParagraphFile::Wrapped { paragraphs: p } => p,
    })
}

/// Extract and flatten the configured target sections.
pub fn document_sections(paragraphs: &[Paragraph], config: &TriageConfig, separator: &str) -> FlatSections {
    let tree = extract_sections(paragraphs, &config.target_paths);
    flatten(&tree, separator)
}

pub fn section_entry_id(doc_id: &str, path: &str) -> String {
    blake3::hash(format!("{doc_id}::{path}").as_bytes())
        .to_hex()
        .to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentIndexReport {
    pub doc_id: String,
    pub sections: usize,
    pub indexed: usize,
    /// Section paths whose embedding failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
}

/// Embed and upsert every section of one document.
///
/// Embedding failures skip that section only; a store failure aborts the
/// document.
pub async fn index_sections(
    doc_id: &str,
    sections: &FlatSections,
    embedder: &dyn Embedder,
    store: &dyn SimilarityStore,
) -> Result<DocumentIndexReport, SimilarityStoreError> {
    let mut report = DocumentIndexReport {
        doc_id: doc_id.to_string(),
        sections: sections.len(),
        ..Default::default()
    };

    for (path, text) in sections.iter() {
        if text.is_empty() {
            debug!(doc_id, section = path, "Empty section, nothing to embed");
            report.skipped.push(path.to_string());
            continue;
        }
        let embedding = match embedder.embed(text).await {
            Ok(v) => v,
            Err(e) => {
                warn!(doc_id, section = path, error = %e, "Section embedding failed, skipped");
                report.skipped.push(path.to_string());
                continue;
            }
        };
        let metadata = BTreeMap::from([
            ("doc_id".to_string(), doc_id.to_string()),
            ("section".to_string(), path.to_string()),
        ]);
        store
            .upsert(IndexEntry {
                id: section_entry_id(doc_id, path),
                embedding,
                document: text.to_string(),
                metadata,
            })
            .await?;
        report.indexed += 1;
    }

    info!(
        doc_id,
        sections = report.sections,
        indexed = report.indexed,
        skipped = report.skipped.len(),
        "Document indexed"
    );
    Ok(report)
}
