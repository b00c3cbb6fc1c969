//! Similarity-based context retrieval.
//!
//! Embeds a user query, runs a nearest-neighbor search in the topic
//! partition, and joins the chunk texts that clear the similarity
//! threshold into a single context string for prompt injection.

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::index::VectorIndex;

pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl ContextRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Retrieve grounding context for `query` within `topic`.
    ///
    /// Results with `score <= threshold` are discarded; survivors are
    /// concatenated in descending-score order, separated by a blank
    /// line. An empty string is the valid "no relevant context" signal,
    /// not an error.
    ///
    /// # Errors
    ///
    /// Embedding failures abort retrieval (a missing query vector makes
    /// search impossible), as do index failures.
    pub async fn retrieve(
        &self,
        query: &str,
        topic: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<String, PipelineError> {
        let query_vec = self.embedder.embed(query).await?;
        let matches = self.index.query(&query_vec, topic, top_k).await?;

        let surviving: Vec<&str> = matches
            .iter()
            .filter(|m| m.score > threshold)
            .map(|m| m.text.as_str())
            .collect();

        tracing::debug!(
            topic,
            candidates = matches.len(),
            kept = surviving.len(),
            "context retrieval"
        );

        Ok(surviving.join("\n\n"))
    }
}
