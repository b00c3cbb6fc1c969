//! Schema migrations and index dimension bookkeeping.
//!
//! `run_migrations` is idempotent. The embedding dimension configured at
//! `kb init` time is recorded in `index_meta`; later runs verify it so a
//! changed `embedding.dims` fails fast instead of corrupting the index.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::error::PipelineError;

pub async fn run_migrations(pool: &SqlitePool, dims: usize) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            document_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            topic TEXT NOT NULL,
            file_type TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'uploaded',
            chunk_count INTEGER NOT NULL DEFAULT 0,
            content_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            topic TEXT NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            content_hash TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            topic TEXT NOT NULL,
            start_time INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            session_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            PRIMARY KEY (session_id, seq),
            FOREIGN KEY (session_id) REFERENCES sessions(session_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS error_logs (
            error_id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            level TEXT NOT NULL,
            component TEXT NOT NULL,
            topic TEXT,
            error_kind TEXT NOT NULL,
            message TEXT NOT NULL,
            details TEXT NOT NULL DEFAULT '{}',
            resolved INTEGER NOT NULL DEFAULT 0,
            resolution_date INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_topic ON vectors(topic)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_vectors_document ON vectors(document_id, topic)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_topic ON documents(topic)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_error_logs_ts ON error_logs(timestamp DESC)")
        .execute(pool)
        .await?;

    sqlx::query("INSERT INTO index_meta (key, value) VALUES ('dims', ?) ON CONFLICT(key) DO NOTHING")
        .bind(dims.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Verify the configured embedding dimension matches the initialized
/// index. A mismatch is a fatal configuration error.
pub async fn check_dimension(pool: &SqlitePool, dims: usize) -> Result<(), PipelineError> {
    let meta_table: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'index_meta'",
    )
    .fetch_optional(pool)
    .await
    .map_err(|e| PipelineError::Persistence(e.to_string()))?;
    if meta_table.is_none() {
        return Err(PipelineError::Configuration(
            "index not initialized; run `kb init` first".to_string(),
        ));
    }

    let stored: Option<String> =
        sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'dims'")
            .fetch_optional(pool)
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

    match stored.and_then(|s| s.parse::<usize>().ok()) {
        Some(stored_dims) if stored_dims == dims => Ok(()),
        Some(stored_dims) => Err(PipelineError::Configuration(format!(
            "embedding.dims is {} but the index was initialized with {}",
            dims, stored_dims
        ))),
        None => Err(PipelineError::Configuration(
            "index not initialized; run `kb init` first".to_string(),
        )),
    }
}
