//! Durable, append-only error log.
//!
//! Records operational failures so they survive the process. Writing an
//! entry must never take the pipeline down: [`ErrorLogStore::record`]
//! degrades to a `tracing` warning when the insert itself fails.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::ErrorEntry;

pub struct ErrorLogStore {
    pool: SqlitePool,
}

impl ErrorLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a pipeline failure. Best-effort: an insert failure is
    /// logged and swallowed.
    pub async fn record(&self, topic: Option<&str>, error: &PipelineError) {
        let result = sqlx::query(
            r#"
            INSERT INTO error_logs (error_id, timestamp, level, component, topic, error_kind, message, details)
            VALUES (?, ?, 'error', ?, ?, ?, ?, '{}')
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(chrono::Utc::now().timestamp())
        .bind(error.component())
        .bind(topic)
        .bind(error.kind())
        .bind(error.to_string())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to write error log entry");
        }
    }

    /// Most recent entries, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<ErrorEntry>, PipelineError> {
        let rows = sqlx::query(
            r#"
            SELECT error_id, timestamp, level, component, topic, error_kind, message, details,
                   resolved, resolution_date
            FROM error_logs
            ORDER BY timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        let entries = rows
            .iter()
            .map(|row| {
                let details_raw: String = row.get("details");
                let resolved: i64 = row.get("resolved");
                ErrorEntry {
                    error_id: row.get("error_id"),
                    timestamp: row.get("timestamp"),
                    level: row.get("level"),
                    component: row.get("component"),
                    topic: row.get("topic"),
                    error_kind: row.get("error_kind"),
                    message: row.get("message"),
                    details: serde_json::from_str(&details_raw)
                        .unwrap_or(serde_json::json!({})),
                    resolved: resolved != 0,
                    resolution_date: row.get("resolution_date"),
                }
            })
            .collect();

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::run_migrations;

    async fn test_store() -> ErrorLogStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool, 1536).await.unwrap();
        ErrorLogStore::new(pool)
    }

    #[tokio::test]
    async fn records_classified_failures() {
        let store = test_store().await;
        store
            .record(
                Some("school_info"),
                &PipelineError::Embedding("timeout".into()),
            )
            .await;

        let entries = store.recent(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].component, "embedding_service");
        assert_eq!(entries[0].error_kind, "embedding_generation");
        assert_eq!(entries[0].topic.as_deref(), Some("school_info"));
        assert!(!entries[0].resolved);
    }

    #[tokio::test]
    async fn recent_respects_limit() {
        let store = test_store().await;
        for i in 0..5 {
            store
                .record(None, &PipelineError::Completion(format!("err {}", i)))
                .await;
        }
        let entries = store.recent(3).await.unwrap();
        assert_eq!(entries.len(), 3);
    }
}
