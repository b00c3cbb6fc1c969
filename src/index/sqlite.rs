//! SQLite-backed [`VectorIndex`].
//!
//! Embeddings are stored as little-endian f32 BLOBs; similarity search
//! is brute-force cosine over the topic partition, computed in Rust.
//! Adequate for a single school's knowledge base (thousands of chunks).

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::PipelineError;

use super::{validate_topic, ChunkVector, ScoredChunk, UpsertReport, VectorIndex};

/// Vectors written per transaction during batch upsert.
const UPSERT_BATCH_SIZE: usize = 100;

pub struct SqliteIndex {
    pool: SqlitePool,
    dims: usize,
    topics: Vec<String>,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool, dims: usize, topics: Vec<String>) -> Self {
        Self { pool, dims, topics }
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
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

        for batch in vectors.chunks(UPSERT_BATCH_SIZE) {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| PipelineError::Persistence(e.to_string()))?;

            for cv in batch {
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

                let result = sqlx::query(
                    r#"
                    INSERT INTO vectors (id, document_id, chunk_index, topic, text, embedding, content_hash)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        text = excluded.text,
                        embedding = excluded.embedding,
                        content_hash = excluded.content_hash
                    "#,
                )
                .bind(&cv.id)
                .bind(&cv.document_id)
                .bind(cv.chunk_index)
                .bind(topic)
                .bind(&cv.text)
                .bind(vec_to_blob(&cv.embedding))
                .bind(&cv.content_hash)
                .execute(&mut *tx)
                .await;

                match result {
                    Ok(_) => report.succeeded += 1,
                    Err(e) => report.skipped.push((cv.chunk_index, e.to_string())),
                }
            }

            tx.commit()
                .await
                .map_err(|e| PipelineError::Persistence(e.to_string()))?;
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

        // rowid order = insertion order, which a stable sort preserves
        // for equal scores.
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, text, embedding FROM vectors WHERE topic = ? ORDER BY rowid",
        )
        .bind(topic)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        let mut candidates: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                ScoredChunk {
                    id: row.get("id"),
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    score: cosine_similarity(vector, &stored),
                    text: row.get("text"),
                }
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

        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM vectors WHERE document_id = ? AND topic = ?")
                .bind(document_id)
                .bind(topic)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        Ok(ids)
    }

    async fn chunks_by_document(
        &self,
        document_id: &str,
        topic: &str,
    ) -> Result<Vec<String>, PipelineError> {
        validate_topic(&self.topics, topic)?;

        let texts: Vec<String> = sqlx::query_scalar(
            "SELECT text FROM vectors WHERE document_id = ? AND topic = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .bind(topic)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        Ok(texts)
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

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        let mut deleted = 0u64;
        for id in &ids {
            let result = sqlx::query("DELETE FROM vectors WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| PipelineError::Persistence(e.to_string()))?;
            deleted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::run_migrations;

    async fn test_index(dims: usize) -> SqliteIndex {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool, dims).await.unwrap();
        SqliteIndex::new(pool, dims, vec!["school_info".to_string()])
    }

    fn cv(id: &str, doc: &str, idx: i64, embedding: Vec<f32>) -> ChunkVector {
        ChunkVector {
            id: id.to_string(),
            document_id: doc.to_string(),
            chunk_index: idx,
            text: format!("chunk {}", idx),
            embedding,
            content_hash: "h".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_then_query_ranks_self_first() {
        let index = test_index(3).await;
        let report = index
            .upsert(
                &[
                    cv("a-0-x", "a", 0, vec![1.0, 0.0, 0.0]),
                    cv("a-1-x", "a", 1, vec![0.0, 1.0, 0.0]),
                    cv("a-2-x", "a", 2, vec![0.0, 0.0, 1.0]),
                ],
                "school_info",
            )
            .await
            .unwrap();
        assert_eq!(report.succeeded, 3);
        assert!(report.skipped.is_empty());

        let results = index
            .query(&[0.0, 1.0, 0.0], "school_info", 3)
            .await
            .unwrap();
        assert_eq!(results[0].id, "a-1-x");
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!(results[1].score < results[0].score);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_id() {
        let index = test_index(2).await;
        let v = cv("a-0-x", "a", 0, vec![1.0, 0.0]);
        index.upsert(&[v.clone()], "school_info").await.unwrap();
        index.upsert(&[v], "school_info").await.unwrap();

        let ids = index.ids_by_document("a", "school_info").await.unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn wrong_dimension_vectors_are_skipped_not_fatal() {
        let index = test_index(3).await;
        let report = index
            .upsert(
                &[
                    cv("a-0-x", "a", 0, vec![1.0, 0.0, 0.0]),
                    cv("a-1-x", "a", 1, vec![1.0, 0.0]),
                ],
                "school_info",
            )
            .await
            .unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, 1);
    }

    #[tokio::test]
    async fn queries_never_cross_topics() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool, 2).await.unwrap();
        let index = SqliteIndex::new(
            pool,
            2,
            vec!["school_info".to_string(), "staff".to_string()],
        );

        index
            .upsert(&[cv("a-0-x", "a", 0, vec![1.0, 0.0])], "school_info")
            .await
            .unwrap();

        let results = index.query(&[1.0, 0.0], "staff", 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn unknown_topic_is_rejected() {
        let index = test_index(2).await;
        let err = index.query(&[1.0, 0.0], "grades", 5).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn chunks_by_document_are_ordered_by_index() {
        let index = test_index(2).await;
        // Inserted out of order on purpose.
        index
            .upsert(
                &[
                    cv("a-2-x", "a", 2, vec![0.0, 1.0]),
                    cv("a-0-x", "a", 0, vec![1.0, 0.0]),
                    cv("a-1-x", "a", 1, vec![0.5, 0.5]),
                ],
                "school_info",
            )
            .await
            .unwrap();

        let texts = index.chunks_by_document("a", "school_info").await.unwrap();
        assert_eq!(texts, vec!["chunk 0", "chunk 1", "chunk 2"]);
    }

    #[tokio::test]
    async fn delete_by_document_is_idempotent() {
        let index = test_index(2).await;
        index
            .upsert(
                &[
                    cv("a-0-x", "a", 0, vec![1.0, 0.0]),
                    cv("a-1-x", "a", 1, vec![0.0, 1.0]),
                    cv("b-0-x", "b", 0, vec![0.5, 0.5]),
                ],
                "school_info",
            )
            .await
            .unwrap();

        let first = index.delete_by_document("a", "school_info").await.unwrap();
        assert_eq!(first, 2);
        let second = index.delete_by_document("a", "school_info").await.unwrap();
        assert_eq!(second, 0);

        // Unrelated document untouched
        let ids = index.ids_by_document("b", "school_info").await.unwrap();
        assert_eq!(ids.len(), 1);
    }
}
