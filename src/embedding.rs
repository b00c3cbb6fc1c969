//! Embedding provider abstraction and OpenAI implementation.
//!
//! The [`Embedder`] trait is the single seam between the pipeline and
//! the external embedding service; the orchestrator holds an injected
//! handle so tests can substitute a deterministic double.
//!
//! Also provides vector utilities shared with the SQLite index:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] — little-endian f32 BLOB codec
//!
//! # Retry strategy (OpenAI provider)
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::PipelineError;

/// Converts text into a fixed-dimension vector via an external service.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text. The returned vector always has [`dims`](Embedder::dims)
    /// elements.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError>;

    /// Fixed vector dimensionality for this deployment (e.g. `1536`).
    fn dims(&self) -> usize;
}

/// Embedding provider backed by the OpenAI embeddings API.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    /// Create a provider from configuration.
    ///
    /// # Errors
    ///
    /// `Configuration` when `OPENAI_API_KEY` is not set or the HTTP
    /// client cannot be built. Missing credentials are fatal at startup,
    /// not a per-call failure.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, PipelineError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            PipelineError::Configuration("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| PipelineError::Embedding(e.to_string()))?;
                        let vector = parse_embedding_response(&json)?;
                        if vector.len() != self.dims {
                            return Err(PipelineError::Configuration(format!(
                                "embedding dimension mismatch: model '{}' returned {} dims, configured {}",
                                self.model,
                                vector.len(),
                                self.dims
                            )));
                        }
                        return Ok(vector);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(PipelineError::Embedding(format!(
                            "embedding API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(PipelineError::Embedding(format!(
                        "embedding API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(PipelineError::Embedding(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| PipelineError::Embedding("embedding failed after retries".into())))
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Parse `data[0].embedding` from the embeddings API response.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>, PipelineError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|arr| arr.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            PipelineError::Embedding("invalid embeddings response: missing data[0].embedding".into())
        })?;

    Ok(embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect())
}

/// Encode an embedding for the `vectors.embedding` BLOB column:
/// little-endian f32, four bytes per component.
pub fn vec_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a stored embedding BLOB. Trailing bytes that do not form a
/// whole f32 are dropped.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity between a query vector and a stored chunk
/// embedding, in `[-1.0, 1.0]`.
///
/// Mismatched lengths and zero-magnitude vectors score `0.0`, so a
/// malformed row ranks last instead of failing the whole query.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|y| y * y).sum::<f32>().sqrt();

    let magnitude = norm_a * norm_b;
    if magnitude < f32::EPSILON {
        return 0.0;
    }

    dot / magnitude
}
