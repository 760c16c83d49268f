use crate::model::{Message, PreferenceFact, SessionSummary};
use anyhow::Result;
use async_trait::async_trait;

/// Durable per-session conversation state.
///
/// The orchestrator treats this as at-least-once durable: a crash between a
/// tool call completing and `save` may cause that call to be re-issued on
/// resume, so tool adapters are expected to be safely re-callable. Two
/// processes driving the same `thread_id` concurrently is a non-goal; no
/// distributed locking is assumed.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Ordered message history, empty for an unseen `thread_id`.
    async fn load(&self, thread_id: &str) -> Result<Vec<Message>>;

    /// Replace the stored history for `thread_id`.
    async fn save(&self, thread_id: &str, history: &[Message]) -> Result<()>;

    /// Create the thread index row if absent (first message with an unseen
    /// id creates the session).
    async fn ensure_session(&self, thread_id: &str, user_id: &str, title: &str) -> Result<()>;

    /// Update the session title (set once from extraction on the first turn).
    async fn set_title(&self, thread_id: &str, title: &str) -> Result<()>;

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>>;

    /// True if the thread index has a row for `thread_id`, whoever owns it.
    async fn session_exists(&self, thread_id: &str) -> Result<bool>;

    /// True if the thread exists and belongs to `user_id`.
    async fn session_owned_by(&self, thread_id: &str, user_id: &str) -> Result<bool>;

    /// Idempotent: deleting a nonexistent id is not an error.
    async fn delete_session(&self, thread_id: &str) -> Result<()>;
}

/// Durable per-user preference facts, keyed by `(user_id, key)`.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn preferences(&self, user_id: &str) -> Result<Vec<PreferenceFact>>;

    /// Upsert by key: a new extraction with the same key replaces the prior
    /// value, never duplicates.
    async fn upsert(&self, fact: &PreferenceFact) -> Result<()>;
}
