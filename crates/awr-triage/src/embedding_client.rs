//! OpenAI-compatible `/embeddings` client implementing [`Embedder`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use triage_core::{Embedder, EmbeddingError};

use crate::config::EmbeddingEndpoint;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingResponse {
    pub data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingDatum {
    #[serde(default)]
    pub index: usize,
    pub embedding: Vec<f32>,
}

/// Order vectors by `index` and check count and length.
pub fn vectors_from_response(
    response: EmbeddingResponse,
    expected_count: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if response.data.len() != expected_count {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {expected_count} vectors, got {}",
            response.data.len()
        )));
    }
    let mut data = response.data;
    data.sort_by_key(|d| d.index);
    data.into_iter()
        .map(|d| {
            if d.embedding.len() == dimension {
                Ok(d.embedding)
            } else {
                Err(EmbeddingError::InvalidResponse(format!(
                    "vector length {} does not match configured dimension {dimension}",
                    d.embedding.len()
                )))
            }
        })
        .collect()
}

pub struct EmbeddingClient {
    client: reqwest::Client,
    endpoint: EmbeddingEndpoint,
}

impl EmbeddingClient {
    pub fn new(client: reqwest::Client, endpoint: EmbeddingEndpoint) -> Self {
        Self { client, endpoint }
    }

    /// Embed several texts in one request, returned in input order.
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::EmptyInput);
        }

        let url = format!("{}/embeddings", self.endpoint.url.trim_end_matches('/'));
        let body = EmbeddingRequest {
            model: &self.endpoint.model,
            input: texts,
            dimensions: Some(self.endpoint.dimensions),
        };
        debug!(%url, count = texts.len(), model = %self.endpoint.model, "Embedding request");

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(EmbeddingError::Request(format!("HTTP {status}: {text}")));
        }
        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
        vectors_from_response(parsed, texts.len(), self.endpoint.dimensions)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no vector returned".into()))
    }

    fn dimension(&self) -> usize {
        self.endpoint.dimensions
    }
}
