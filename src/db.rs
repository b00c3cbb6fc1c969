//! Connection pool for the knowledge-base database.
//!
//! One SQLite file holds everything: documents, vectors, sessions, and
//! the error log. WAL keeps concurrent readers (a question being
//! answered) from blocking an ingest in progress.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::config::Config;

/// Connections kept in the pool. The pipeline is a handful of stores
/// sharing one file; a small pool is plenty.
const MAX_CONNECTIONS: u32 = 5;

/// Open (creating if missing) the knowledge-base database from
/// `config.db.path`.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let path = &config.db.path;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
        .with_context(|| format!("opening knowledge-base database {}", path.display()))
}
