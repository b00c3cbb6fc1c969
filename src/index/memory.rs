//! In-memory [`VectorIndex`] for tests.
//!
//! Uses a `Vec` behind `std::sync::RwLock`; similarity search is
//! brute-force cosine over the topic partition. Insertion order is the
//! vector's position in the backing `Vec`, which a stable sort preserves
//! for tied scores.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::PipelineError;

use super::{validate_topic, ChunkVector, ScoredChunk, UpsertReport, VectorIndex};

struct StoredVector {
    topic: String,
    vector: ChunkVector,
}

pub struct InMemoryIndex {
    dims: usize,
    topics: Vec<String>,
    vectors: RwLock<Vec<StoredVector>>,
}

impl InMemoryIndex {
    pub fn new(dims: usize, topics: Vec<String>) -> Self {
        Self {
            dims,
            topics,
            vectors: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(
        &self,
        vectors: &[ChunkVector],
        topic: &str,
    ) -> Result<UpsertReport, PipelineError> {
        validate_topic(&self.topics, topic)?;

        let mut report = UpsertReport::default();
        let mut stored = self.vectors.write().unwrap();

        for cv in vectors {
            if cv.embedding.len() != self.dims {
                report.skipped.push((
                    cv.chunk_index,
                    format!(
                        "vector has {} dims, index expects {}",
                        cv.embedding.len(),
                        self.dims
                    ),
                ));
                continue;
            }
            stored.retain(|sv| sv.vector.id != cv.id);
            stored.push(StoredVector {
                topic: topic.to_string(),
                vector: cv.clone(),
            });
            report.succeeded += 1;
        }

        Ok(report)
    }

    async fn query(
        &self,
        vector: &[f32],
        topic: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, PipelineError> {
        validate_topic(&self.topics, topic)?;

        let stored = self.vectors.read().unwrap();
        let mut candidates: Vec<ScoredChunk> = stored
            .iter()
            .filter(|sv| sv.topic == topic)
            .map(|sv| ScoredChunk {
                id: sv.vector.id.clone(),
                document_id: sv.vector.document_id.clone(),
                chunk_index: sv.vector.chunk_index,
                score: cosine_similarity(vector, &sv.vector.embedding),
                text: sv.vector.text.clone(),
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_k);

        Ok(candidates)
    }

    async fn ids_by_document(
        &self,
        document_id: &str,
        topic: &str,
    ) -> Result<Vec<String>, PipelineError> {
        validate_topic(&self.topics, topic)?;

        let stored = self.vectors.read().unwrap();
        Ok(stored
            .iter()
            .filter(|sv| sv.topic == topic && sv.vector.document_id == document_id)
            .map(|sv| sv.vector.id.clone())
            .collect())
    }

    async fn chunks_by_document(
        &self,
        document_id: &str,
        topic: &str,
    ) -> Result<Vec<String>, PipelineError> {
        validate_topic(&self.topics, topic)?;

        let stored = self.vectors.read().unwrap();
        let mut chunks: Vec<(i64, String)> = stored
            .iter()
            .filter(|sv| sv.topic == topic && sv.vector.document_id == document_id)
            .map(|sv| (sv.vector.chunk_index, sv.vector.text.clone()))
            .collect();
        chunks.sort_by_key(|(idx, _)| *idx);

        Ok(chunks.into_iter().map(|(_, text)| text).collect())
    }

    async fn delete_by_document(
        &self,
        document_id: &str,
        topic: &str,
    ) -> Result<u64, PipelineError> {
        let ids = self.ids_by_document(document_id, topic).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let mut stored = self.vectors.write().unwrap();
        let before = stored.len();
        stored.retain(|sv| !ids.contains(&sv.vector.id));
        Ok((before - stored.len()) as u64)
    }
}
