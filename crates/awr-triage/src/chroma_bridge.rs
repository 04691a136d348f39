//! Chroma HTTP (v1 API) bridge implementing [`SimilarityStore`].
//!
//! The collection is created on first use with `hnsw:space = cosine`, so the
//! distances Chroma reports are `1 − cos` and `1 − distance` is a similarity.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use triage_core::{IndexEntry, SimilarityHit, SimilarityStore, SimilarityStoreError};

use crate::config::ChromaEndpoint;

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
}

/// Column-oriented query response; one inner list per query embedding.
#[derive(Debug, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub ids: Vec<Vec<String>>,
    #[serde(default)]
    pub distances: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Vec<Option<Map<String, Value>>>>>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    ids: Vec<&'a str>,
    embeddings: Vec<&'a [f32]>,
    documents: Vec<&'a str>,
    metadatas: Vec<&'a BTreeMap<String, String>>,
}

fn metadata_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Translate the first result row of a query response into hits.
pub fn hits_from_response(response: QueryResponse) -> Result<Vec<SimilarityHit>, SimilarityStoreError> {
    let ids = response.ids.into_iter().next().unwrap_or_default();
    let distances = response
        .distances
        .and_then(|d| d.into_iter().next())
        .ok_or_else(|| SimilarityStoreError::InvalidResponse("query response has no distances".into()))?;
    if distances.len() != ids.len() {
        return Err(SimilarityStoreError::InvalidResponse(format!(
            "{} ids but {} distances",
            ids.len(),
            distances.len()
        )));
    }
    let mut documents = response
        .documents
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default()
        .into_iter();
    let mut metadatas = response
        .metadatas
        .and_then(|m| m.into_iter().next())
        .unwrap_or_default()
        .into_iter();

    let mut hits: Vec<SimilarityHit> = ids
        .into_iter()
        .zip(distances)
        .map(|(id, distance)| {
            let metadata = metadatas
                .next()
                .flatten()
                .map(|m| {
                    m.iter()
                        .map(|(k, v)| (k.clone(), metadata_value_to_string(v)))
                        .collect()
                })
                .unwrap_or_default();
            SimilarityHit {
                id,
                distance,
                document: documents.next().flatten(),
                metadata,
            }
        })
        .collect();
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    Ok(hits)
}

pub struct ChromaBridge {
    client: reqwest::Client,
    endpoint: ChromaEndpoint,
    collection_id: OnceCell<String>,
}

impl ChromaBridge {
    pub fn new(client: reqwest::Client, endpoint: ChromaEndpoint) -> Self {
        Self {
            client,
            endpoint,
            collection_id: OnceCell::new(),
        }
    }

    fn base(&self) -> &str {
        self.endpoint.url.trim_end_matches('/')
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value, SimilarityStoreError> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| SimilarityStoreError::Request(e.to_string()))?;
        decode(resp).await
    }

    async fn collection(&self) -> Result<&str, SimilarityStoreError> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let url = format!("{}/api/v1/collections", self.base());
                let body = json!({
                    "name": self.endpoint.collection,
                    "metadata": { "hnsw:space": "cosine" },
                    "get_or_create": true,
                });
                let value = self.post(&url, &body).await?;
                let info: CollectionInfo = serde_json::from_value(value)
                    .map_err(|e| SimilarityStoreError::InvalidResponse(e.to_string()))?;
                info!(collection = %self.endpoint.collection, id = %info.id, "Chroma collection ready");
                Ok::<_, SimilarityStoreError>(info.id)
            })
            .await?;
        Ok(id.as_str())
    }
}

async fn decode(resp: reqwest::Response) -> Result<Value, SimilarityStoreError> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| SimilarityStoreError::Request(e.to_string()))?;
    if !status.is_success() {
        return Err(SimilarityStoreError::Request(format!("HTTP {status}: {text}")));
    }
    serde_json::from_str(&text).map_err(|e| SimilarityStoreError::InvalidResponse(e.to_string()))
}

/// Body of `POST /collections/{id}/get`.
#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
}

#[async_trait]
impl SimilarityStore for ChromaBridge {
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SimilarityHit>, SimilarityStoreError> {
        let id = self.collection().await?;
        let url = format!("{}/api/v1/collections/{id}/query", self.base());
        let body = json!({
            "query_embeddings": [embedding],
            "n_results": top_k,
            "include": ["documents", "metadatas", "distances"],
        });
        let value = self.post(&url, &body).await?;
        let response: QueryResponse = serde_json::from_value(value)
            .map_err(|e| SimilarityStoreError::InvalidResponse(e.to_string()))?;
        let hits = hits_from_response(response)?;
        debug!(hits = hits.len(), "Chroma query complete");
        Ok(hits)
    }

    async fn upsert(&self, entry: IndexEntry) -> Result<(), SimilarityStoreError> {
        self.upsert_batch(vec![entry]).await.map(|_| ())
    }

    async fn upsert_batch(&self, entries: Vec<IndexEntry>) -> Result<usize, SimilarityStoreError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let id = self.collection().await?;
        let url = format!("{}/api/v1/collections/{id}/upsert", self.base());
        let request = UpsertRequest {
            ids: entries.iter().map(|e| e.id.as_str()).collect(),
            embeddings: entries.iter().map(|e| e.embedding.as_slice()).collect(),
            documents: entries.iter().map(|e| e.document.as_str()).collect(),
            metadatas: entries.iter().map(|e| &e.metadata).collect(),
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| SimilarityStoreError::InvalidResponse(e.to_string()))?;
        self.post(&url, &body).await?;
        debug!(count = entries.len(), "Chroma upsert complete");
        Ok(entries.len())
    }

    async fn count(&self) -> Result<usize, SimilarityStoreError> {
        let id = self.collection().await?;
        let url = format!("{}/api/v1/collections/{id}/count", self.base());
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SimilarityStoreError::Request(e.to_string()))?;
        let value = decode(resp).await?;
        value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| SimilarityStoreError::InvalidResponse(format!("count was {value}")))
    }

    async fn contains(&self, entry_id: &str) -> Result<bool, SimilarityStoreError> {
        let id = self.collection().await?;
        let url = format!("{}/api/v1/collections/{id}/get", self.base());
        let body = json!({ "ids": [entry_id], "include": [] });
        let value = self.post(&url, &body).await?;
        let response: GetResponse = serde_json::from_value(value)
            .map_err(|e| SimilarityStoreError::InvalidResponse(e.to_string()))?;
        Ok(response.ids.iter().any(|found| found == entry_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hits_from_response() {
        let response: QueryResponse = serde_json::from_value(json!({
            "ids": [["b", "a"]],
            "distances": [[0.3, 0.05]],
            "documents": [["doc b", null]],
            "metadatas": [[{"ticket_id": "AWR-2", "version": 3}, null]],
        }))
        .unwrap();
        let hits = hits_from_response(response).unwrap();
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].document, None);
        assert!(hits[0].metadata.is_empty());
        assert_eq!(hits[1].id, "b");
        assert_eq!(hits[1].metadata["ticket_id"], "AWR-2");
        assert_eq!(hits[1].metadata["version"], "3");
    }

    #[test]
    fn test_get_response_ids() {
        let found: GetResponse =
            serde_json::from_value(json!({ "ids": ["AWR-9"], "metadatas": null })).unwrap();
        assert_eq!(found.ids, vec!["AWR-9".to_string()]);
        let missing: GetResponse = serde_json::from_value(json!({ "ids": [] })).unwrap();
        assert!(missing.ids.is_empty());
    }

    #[test]
    fn test_empty_collection_gives_no_hits() {
        let response: QueryResponse = serde_json::from_value(json!({
            "ids": [[]],
            "distances": [[]],
        }))
        .unwrap();
        assert!(hits_from_response(response).unwrap().is_empty());
    }

    #[test]
    fn test_missing_distances_is_invalid() {
        let response: QueryResponse = serde_json::from_value(json!({ "ids": [["a"]] })).unwrap();
        assert!(matches!(
            hits_from_response(response),
            Err(SimilarityStoreError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_upsert_request_shape() {
        let meta = BTreeMap::from([("ticket_id".to_string(), "AWR-1".to_string())]);
        let req = UpsertRequest {
            ids: vec!["AWR-1"],
            embeddings: vec![&[0.5_f32, 0.5][..]],
            documents: vec!["text"],
            metadatas: vec![&meta],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["ids"][0], "AWR-1");
        assert_eq!(json["embeddings"][0][1], 0.5);
        assert_eq!(json["metadatas"][0]["ticket_id"], "AWR-1");
    }
}
