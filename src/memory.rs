//! Conversation persistence.
//!
//! Each message in a user's buffer is appended as one row holding the
//! serialized [`Message`], so buffers survive restarts. Persistence is
//! best-effort: write failures are logged and never abort a turn.

use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::types::Message;

/// Default number of messages loaded to seed a buffer after restart.
pub const DEFAULT_LOAD_LIMIT: usize = 50;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS conversation_turns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_key TEXT NOT NULL,
    role TEXT NOT NULL,
    message_json TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversation_turns_user
ON conversation_turns(user_key);
";

/// Errors from the conversation store.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// SQLite error.
    #[error("conversation database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Message encoding error.
    #[error("conversation serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// SQLite-backed store of per-user conversation history.
#[derive(Clone)]
pub struct ConversationStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore").finish_non_exhaustive()
    }
}

impl ConversationStore {
    /// Wrap an open pool. Call [`ConversationStore::init`] before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the table and index if missing.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] if schema creation fails.
    pub async fn init(&self) -> Result<(), MemoryError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Append one message to a user's history.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError`] on encoding or insert failure.
    pub async fn save(&self, user_key: &str, message: &Message) -> Result<(), MemoryError> {
        let message_json = serde_json::to_string(message)?;
        sqlx::query(
            "INSERT INTO conversation_turns (user_key, role, message_json, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user_key)
        .bind(message.role.as_str())
        .bind(&message_json)
        .bind(message.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load the most recent `limit` messages, oldest first.
    ///
    /// Corrupt rows are skipped with a warning rather than failing the
    /// whole load.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] on query failure.
    pub async fn load_recent(
        &self,
        user_key: &str,
        limit: usize,
    ) -> Result<Vec<Message>, MemoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT message_json FROM conversation_turns
             WHERE user_key = ?1
             ORDER BY id DESC LIMIT ?2",
        )
        .bind(user_key)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::new();
        for row in &rows {
            let raw: String = row.try_get("message_json")?;
            match serde_json::from_str::<Message>(&raw) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(user_key, error = %e, "skipping corrupt conversation row"),
            }
        }
        // Query was newest-first; flip to chronological.
        messages.reverse();
        Ok(messages)
    }

    /// Number of stored messages for a user.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] on query failure.
    pub async fn count(&self, user_key: &str) -> Result<i64, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM conversation_turns WHERE user_key = ?1")
            .bind(user_key)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    /// Keep only the most recent `max` messages for a user.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] on delete failure.
    pub async fn trim(&self, user_key: &str, max: usize) -> Result<(), MemoryError> {
        let max = i64::try_from(max).unwrap_or(i64::MAX);
        sqlx::query(
            "DELETE FROM conversation_turns WHERE user_key = ?1 AND id NOT IN (
                SELECT id FROM conversation_turns WHERE user_key = ?1
                ORDER BY id DESC LIMIT ?2
            )",
        )
        .bind(user_key)
        .bind(max)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
