//! Chat session persistence.
//!
//! One [`ChatSession`] per `session_id`, created lazily on the first
//! query. The `session_id` column is the primary key, so concurrent
//! creation of the same session collapses to a single row. `save`
//! replaces the full message list in one transaction; a failed save
//! leaves the previous state intact and the caller keeps the in-memory
//! session.

use chrono::{TimeZone, Utc};
use sqlx::{Row, SqlitePool};

use crate::error::PipelineError;
use crate::models::{ChatSession, Message, Role};

pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch a session, creating it with an empty history when absent.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        topic: &str,
    ) -> Result<ChatSession, PipelineError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO sessions (session_id, topic, start_time) VALUES (?, ?, ?) \
             ON CONFLICT(session_id) DO NOTHING",
        )
        .bind(session_id)
        .bind(topic)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        let row = sqlx::query("SELECT topic, start_time FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        let start_ts: i64 = row.get("start_time");
        let start_time = Utc
            .timestamp_opt(start_ts, 0)
            .single()
            .unwrap_or_else(Utc::now);

        let message_rows = sqlx::query(
            "SELECT role, content FROM messages WHERE session_id = ? ORDER BY seq",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        let mut messages = Vec::with_capacity(message_rows.len());
        for mrow in &message_rows {
            let role_str: String = mrow.get("role");
            let role = Role::parse(&role_str).ok_or_else(|| {
                PipelineError::Persistence(format!("unknown message role '{}'", role_str))
            })?;
            messages.push(Message {
                role,
                content: mrow.get("content"),
            });
        }

        Ok(ChatSession {
            session_id: session_id.to_string(),
            topic: row.get("topic"),
            start_time,
            messages,
        })
    }

    /// Persist the session's full message list. All-or-nothing.
    pub async fn save(&self, session: &ChatSession) -> Result<(), PipelineError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(&session.session_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        for (seq, message) in session.messages.iter().enumerate() {
            sqlx::query(
                "INSERT INTO messages (session_id, seq, role, content) VALUES (?, ?, ?, ?)",
            )
            .bind(&session.session_id)
            .bind(seq as i64)
            .bind(message.role.as_str())
            .bind(&message.content)
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        Ok(())
    }
}
