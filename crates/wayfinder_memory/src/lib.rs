//! SQLite persistence.
//!
//! Three tables back the agent's durable state:
//! - `checkpoints`: full message history per thread, serialized as JSON.
//!   Saved once per turn at the terminal state, loaded at turn start, which
//!   is what makes sessions survive process restarts.
//! - `chat_threads`: the session index (owner, title, recency).
//! - `preference_facts`: long-term per-user facts, upserted by
//!   `(user_id, pref_key)` so restated preferences update in place.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use wayfinder_core::{CheckpointStore, Message, PreferenceFact, PreferenceStore, SessionSummary};

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!("SQLite store ready at {}", db_path.as_ref().display());
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT PRIMARY KEY,
                history TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create checkpoints table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_threads (
                thread_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create chat_threads table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS preference_facts (
                user_id TEXT NOT NULL,
                pref_key TEXT NOT NULL,
                pref_value TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 0.7,
                source_turn TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, pref_key)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create preference_facts table")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_preference_facts_user_updated
             ON preference_facts(user_id, updated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create preference_facts index")?;

        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn load(&self, thread_id: &str) -> Result<Vec<Message>> {
        let row = sqlx::query("SELECT history FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load checkpoint")?;

        match row {
            Some(row) => {
                let history: String = row.get("history");
                serde_json::from_str(&history).context("Failed to decode checkpoint history")
            }
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, thread_id: &str, history: &[Message]) -> Result<()> {
        let encoded =
            serde_json::to_string(history).context("Failed to encode checkpoint history")?;
        sqlx::query(
            "INSERT INTO checkpoints (thread_id, history, updated_at)
             VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(thread_id) DO UPDATE SET
                 history = excluded.history,
                 updated_at = CURRENT_TIMESTAMP",
        )
        .bind(thread_id)
        .bind(&encoded)
        .execute(&self.pool)
        .await
        .context("Failed to save checkpoint")?;

        // Keep the session index recency in step with the checkpoint.
        sqlx::query(
            "UPDATE chat_threads SET updated_at = CURRENT_TIMESTAMP WHERE thread_id = ?",
        )
        .bind(thread_id)
        .execute(&self.pool)
        .await
        .context("Failed to touch chat thread")?;
        Ok(())
    }

    async fn ensure_session(&self, thread_id: &str, user_id: &str, title: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO chat_threads (thread_id, user_id, title)
             VALUES (?, ?, ?)
             ON CONFLICT(thread_id) DO NOTHING",
        )
        .bind(thread_id)
        .bind(user_id)
        .bind(title)
        .execute(&self.pool)
        .await
        .context("Failed to ensure chat thread")?;
        Ok(())
    }

    async fn set_title(&self, thread_id: &str, title: &str) -> Result<()> {
        sqlx::query("UPDATE chat_threads SET title = ? WHERE thread_id = ?")
            .bind(title)
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .context("Failed to update session title")?;
        Ok(())
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            "SELECT thread_id, title, updated_at FROM chat_threads
             WHERE user_id = ?
             ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list sessions")?;

        Ok(rows
            .iter()
            .map(|row| SessionSummary {
                id: row.get("thread_id"),
                title: row.get("title"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    async fn session_exists(&self, thread_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM chat_threads WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up session")?;
        Ok(row.is_some())
    }

    async fn session_owned_by(&self, thread_id: &str, user_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT user_id FROM chat_threads WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up session owner")?;
        Ok(row.is_some_and(|r| r.get::<String, _>("user_id") == user_id))
    }

    async fn delete_session(&self, thread_id: &str) -> Result<()> {
        // Idempotent: deleting a missing session is not an error.
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete checkpoint")?;
        sqlx::query("DELETE FROM chat_threads WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete chat thread")?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for SqliteStore {
    async fn preferences(&self, user_id: &str) -> Result<Vec<PreferenceFact>> {
        let rows = sqlx::query(
            "SELECT user_id, pref_key, pref_value, confidence, source_turn
             FROM preference_facts
             WHERE user_id = ?
             ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load preference facts")?;

        Ok(rows
            .iter()
            .map(|row| PreferenceFact {
                user_id: row.get("user_id"),
                key: row.get("pref_key"),
                value: row.get("pref_value"),
                confidence: row.get::<f64, _>("confidence") as f32,
                source_turn: row.get("source_turn"),
            })
            .collect())
    }

    async fn upsert(&self, fact: &PreferenceFact) -> Result<()> {
        sqlx::query(
            "INSERT INTO preference_facts
                 (user_id, pref_key, pref_value, confidence, source_turn, updated_at)
             VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(user_id, pref_key) DO UPDATE SET
                 pref_value = excluded.pref_value,
                 confidence = excluded.confidence,
                 source_turn = excluded.source_turn,
                 updated_at = CURRENT_TIMESTAMP",
        )
        .bind(&fact.user_id)
        .bind(&fact.key)
        .bind(&fact.value)
        .bind(fact.confidence as f64)
        .bind(&fact.source_turn)
        .execute(&self.pool)
        .await
        .context("Failed to upsert preference fact")?;
        Ok(())
    }
}
