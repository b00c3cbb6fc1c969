//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines the storage operations needed by
//! ingestion and retrieval, enabling pluggable backends: the SQLite
//! index for deployments and an in-memory index for tests.
//!
//! A topic is a hard partition: every operation is scoped to exactly one
//! topic and queries never cross topics. Topic names are validated
//! against the closed set from configuration; unknown topics are
//! rejected with a `Validation` error before touching storage.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::PipelineError;

pub use memory::InMemoryIndex;
pub use sqlite::SqliteIndex;

/// An embedded chunk ready for storage.
#[derive(Debug, Clone)]
pub struct ChunkVector {
    /// Vector-store id, `{document_id}-{chunk_index}-{uuid}`.
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
    /// SHA-256 of the chunk text.
    pub content_hash: String,
}

/// A ranked match from [`VectorIndex::query`].
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    /// Cosine similarity to the query vector.
    pub score: f32,
    pub text: String,
}

/// Outcome of a batch upsert.
///
/// Individual vector failures never abort the batch; each skipped item
/// is reported with its chunk index and the reason.
#[derive(Debug, Clone, Default)]
pub struct UpsertReport {
    pub succeeded: usize,
    pub skipped: Vec<(i64, String)>,
}

impl UpsertReport {
    pub fn merge(&mut self, other: UpsertReport) {
        self.succeeded += other.succeeded;
        self.skipped.extend(other.skipped);
    }
}

/// Abstract vector store partitioned by topic.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Configured embedding dimensionality.
    fn dims(&self) -> usize;

    /// Store vectors under a topic. Idempotent by vector id; batches
    /// internally; per-item try/continue.
    async fn upsert(
        &self,
        vectors: &[ChunkVector],
        topic: &str,
    ) -> Result<UpsertReport, PipelineError>;

    /// Nearest-neighbor query by cosine similarity, descending order,
    /// ties broken by insertion order.
    async fn query(
        &self,
        vector: &[f32],
        topic: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, PipelineError>;

    /// Resolve all vector ids belonging to a document.
    async fn ids_by_document(
        &self,
        document_id: &str,
        topic: &str,
    ) -> Result<Vec<String>, PipelineError>;

    /// All chunk texts of a document, ordered by chunk index.
    async fn chunks_by_document(
        &self,
        document_id: &str,
        topic: &str,
    ) -> Result<Vec<String>, PipelineError>;

    /// Two-phase delete of all vectors for a document: resolve ids via
    /// the metadata filter, then delete. Idempotent; deleting an absent
    /// document succeeds with zero effect. Returns the number removed.
    async fn delete_by_document(
        &self,
        document_id: &str,
        topic: &str,
    ) -> Result<u64, PipelineError>;
}

/// Reject topics outside the configured closed set.
pub fn validate_topic(topics: &[String], topic: &str) -> Result<(), PipelineError> {
    if topics.iter().any(|t| t == topic) {
        Ok(())
    } else {
        Err(PipelineError::Validation(format!(
            "unknown topic '{}' (known: {})",
            topic,
            topics.join(", ")
        )))
    }
}
