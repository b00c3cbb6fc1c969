//! Document ingestion pipeline.
//!
//! One file at a time: extract text, chunk, embed, upsert vectors, then
//! register the document. Per-chunk embedding failures are isolated
//! (skip and continue), so a transient service error costs chunks, not
//! the whole document. Re-ingesting the same file content produces a new
//! document; a matching `content_hash` in the same topic only triggers a
//! duplicate warning.

use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::chunk::split_text;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::extract::{extract_text, file_type_of};
use crate::index::{validate_topic, ChunkVector, UpsertReport, VectorIndex};
use crate::models::{Document, DocumentStatus};

/// Result of ingesting one file.
#[derive(Debug)]
pub struct IngestOutcome {
    pub document: Document,
    pub report: UpsertReport,
    /// True when a document with the same extracted-text hash already
    /// existed in the topic.
    pub duplicate_of_existing: bool,
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Ingest one file into the knowledge base.
///
/// # Errors
///
/// Fails before any write for unknown topics, unreadable files,
/// unsupported types, failed extraction, or empty extracted text. After
/// the document row exists, chunk-level embedding failures are recorded
/// in the returned [`UpsertReport`] instead of failing the call.
pub async fn ingest_file(
    config: &Config,
    pool: &SqlitePool,
    embedder: &Arc<dyn Embedder>,
    index: &Arc<dyn VectorIndex>,
    path: &Path,
    topic: &str,
) -> Result<IngestOutcome, PipelineError> {
    validate_topic(&config.topics, topic)?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PipelineError::Validation(format!("invalid file path: {}", path.display())))?
        .to_string();
    let file_type = file_type_of(&name)
        .ok_or_else(|| PipelineError::UnsupportedFileType(format!("{} (no extension)", name)))?;

    let bytes = std::fs::read(path)
        .map_err(|e| PipelineError::Validation(format!("cannot read {}: {}", path.display(), e)))?;

    let text = extract_text(&bytes, &file_type)?;
    if text.trim().is_empty() {
        return Err(PipelineError::Validation(format!(
            "no text could be extracted from {}",
            name
        )));
    }

    let chunks = split_text(
        &text,
        config.chunking.chunk_size,
        config.chunking.chunk_overlap,
    )?;
    if chunks.is_empty() {
        return Err(PipelineError::Validation(format!(
            "{} produced no chunks after trimming",
            name
        )));
    }

    let content_hash = sha256_hex(text.as_bytes());
    let duplicate_of_existing = has_document_with_hash(pool, topic, &content_hash).await?;
    if duplicate_of_existing {
        tracing::warn!(
            file = %name,
            topic,
            "a document with identical content already exists in this topic"
        );
    }

    let document = Document {
        document_id: Uuid::new_v4().to_string(),
        name,
        topic: topic.to_string(),
        file_type,
        file_size: bytes.len() as i64,
        status: DocumentStatus::Uploaded,
        chunk_count: chunks.len() as i64,
        content_hash,
        created_at: chrono::Utc::now().timestamp(),
    };
    insert_document(pool, &document).await?;

    let mut report = UpsertReport::default();
    let mut vectors = Vec::with_capacity(chunks.len());

    for (chunk_index, chunk) in chunks.iter().enumerate() {
        match embedder.embed(chunk).await {
            Ok(embedding) => vectors.push(ChunkVector {
                id: format!("{}-{}-{}", document.document_id, chunk_index, Uuid::new_v4()),
                document_id: document.document_id.clone(),
                chunk_index: chunk_index as i64,
                text: chunk.clone(),
                embedding,
                content_hash: sha256_hex(chunk.as_bytes()),
            }),
            Err(e) => {
                tracing::warn!(
                    document_id = %document.document_id,
                    chunk_index,
                    error = %e,
                    "chunk embedding failed, skipping"
                );
                report.skipped.push((chunk_index as i64, e.to_string()));
            }
        }
    }

    report.merge(index.upsert(&vectors, topic).await?);

    let indexed = Document {
        status: DocumentStatus::Indexed,
        chunk_count: report.succeeded as i64,
        ..document
    };
    mark_indexed(pool, &indexed).await?;

    tracing::info!(
        document_id = %indexed.document_id,
        file = %indexed.name,
        chunks = report.succeeded,
        skipped = report.skipped.len(),
        "document ingested"
    );

    Ok(IngestOutcome {
        document: indexed,
        report,
        duplicate_of_existing,
    })
}

/// Delete a document and its vectors. Idempotent; returns the number of
/// vectors removed.
pub async fn delete_document(
    config: &Config,
    pool: &SqlitePool,
    index: &Arc<dyn VectorIndex>,
    document_id: &str,
    topic: &str,
) -> Result<u64, PipelineError> {
    validate_topic(&config.topics, topic)?;

    let removed = index.delete_by_document(document_id, topic).await?;
    sqlx::query("DELETE FROM documents WHERE document_id = ? AND topic = ?")
        .bind(document_id)
        .bind(topic)
        .execute(pool)
        .await
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;

    Ok(removed)
}

/// All registered documents, newest first.
pub async fn list_documents(pool: &SqlitePool) -> Result<Vec<Document>, PipelineError> {
    let rows = sqlx::query(
        "SELECT document_id, name, topic, file_type, file_size, status, chunk_count, \
         content_hash, created_at FROM documents ORDER BY created_at DESC, document_id",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| PipelineError::Persistence(e.to_string()))?;

    rows.iter().map(document_from_row).collect()
}

async fn has_document_with_hash(
    pool: &SqlitePool,
    topic: &str,
    content_hash: &str,
) -> Result<bool, PipelineError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM documents WHERE topic = ? AND content_hash = ?",
    )
    .bind(topic)
    .bind(content_hash)
    .fetch_one(pool)
    .await
    .map_err(|e| PipelineError::Persistence(e.to_string()))?;

    Ok(count > 0)
}

async fn insert_document(pool: &SqlitePool, doc: &Document) -> Result<(), PipelineError> {
    sqlx::query(
        r#"
        INSERT INTO documents (document_id, name, topic, file_type, file_size, status,
                               chunk_count, content_hash, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&doc.document_id)
    .bind(&doc.name)
    .bind(&doc.topic)
    .bind(&doc.file_type)
    .bind(doc.file_size)
    .bind(doc.status.as_str())
    .bind(doc.chunk_count)
    .bind(&doc.content_hash)
    .bind(doc.created_at)
    .execute(pool)
    .await
    .map_err(|e| PipelineError::Persistence(e.to_string()))?;

    Ok(())
}

async fn mark_indexed(pool: &SqlitePool, doc: &Document) -> Result<(), PipelineError> {
    sqlx::query("UPDATE documents SET status = ?, chunk_count = ? WHERE document_id = ?")
        .bind(doc.status.as_str())
        .bind(doc.chunk_count)
        .bind(&doc.document_id)
        .execute(pool)
        .await
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;

    Ok(())
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Document, PipelineError> {
    let status_str: String = row.get("status");
    let status = DocumentStatus::parse(&status_str).ok_or_else(|| {
        PipelineError::Persistence(format!("unknown document status '{}'", status_str))
    })?;

    Ok(Document {
        document_id: row.get("document_id"),
        name: row.get("name"),
        topic: row.get("topic"),
        file_type: row.get("file_type"),
        file_size: row.get("file_size"),
        status,
        chunk_count: row.get("chunk_count"),
        content_hash: row.get("content_hash"),
        created_at: row.get("created_at"),
    })
}
