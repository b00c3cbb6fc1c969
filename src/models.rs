//! Core data models used throughout the pipeline.
//!
//! These types represent the documents, chat sessions, and error log
//! entries that flow through ingestion and answer generation.

use chrono::{DateTime, Utc};

/// A knowledge-base document registered at ingestion time.
///
/// `chunk_count` is finalized after chunking succeeds; `status` moves
/// from `uploaded` to `indexed` once the vectors are stored. Re-ingesting
/// the same file produces a new `document_id`.
#[derive(Debug, Clone)]
pub struct Document {
    pub document_id: String,
    pub name: String,
    pub topic: String,
    pub file_type: String,
    pub file_size: i64,
    pub status: DocumentStatus,
    pub chunk_count: i64,
    /// SHA-256 of the extracted text, used to warn on duplicate uploads.
    pub content_hash: String,
    pub created_at: i64,
}

/// Processing state of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    Uploaded,
    Indexed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Indexed => "indexed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(DocumentStatus::Uploaded),
            "indexed" => Some(DocumentStatus::Indexed),
            _ => None,
        }
    }
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One turn of a conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A persisted conversation, keyed by `session_id`.
///
/// Created lazily on the first query for a session id. Message order is
/// insertion order and is preserved across save/reload.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub session_id: String,
    pub topic: String,
    pub start_time: DateTime<Utc>,
    pub messages: Vec<Message>,
}

/// An append-only operational error record.
#[derive(Debug, Clone)]
pub struct ErrorEntry {
    pub error_id: String,
    pub timestamp: i64,
    pub level: String,
    pub component: String,
    pub topic: Option<String>,
    pub error_kind: String,
    pub message: String,
    pub details: serde_json::Value,
    pub resolved: bool,
    pub resolution_date: Option<i64>,
}
