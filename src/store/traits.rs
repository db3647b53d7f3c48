//! Unified `Database` trait: single async interface for conversation persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::dialogue::state::{Conversation, MessageRole, StoredMessage};
use crate::error::DatabaseError;

/// Backend-agnostic storage for conversations and their message logs.
///
/// Writes to a single conversation are expected to be serialized by the
/// caller; the state-changing methods still refuse a stale `state_index` so a
/// missed lock cannot skip a question. Each of them records the user's answer
/// in the same transaction as the state change.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Conversations ───────────────────────────────────────────────

    /// Create a conversation for `flow_type` at `state_index = 0`.
    async fn create_conversation(&self, flow_type: &str) -> Result<Conversation, DatabaseError>;

    /// Get a conversation by ID.
    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, DatabaseError>;

    /// Append the user's `answer` and move `state_index` from `expected` to
    /// `expected + 1`, atomically.
    ///
    /// Fails with `DatabaseError::Constraint` (writing nothing) when the stored
    /// index differs from `expected` or the conversation is finished.
    async fn advance_conversation(
        &self,
        id: Uuid,
        expected: u32,
        answer: &str,
    ) -> Result<(u32, StoredMessage), DatabaseError>;

    /// Append the final `answer` and the synthesized `request`, and mark the
    /// conversation finished, atomically. `state_index` is left untouched.
    ///
    /// Same stale-index and finished checks as `advance_conversation`.
    async fn finish_conversation(
        &self,
        id: Uuid,
        expected: u32,
        answer: &str,
        request: &str,
    ) -> Result<Vec<StoredMessage>, DatabaseError>;

    // ── Messages ────────────────────────────────────────────────────

    /// Append a message to a conversation's log.
    async fn append_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<StoredMessage, DatabaseError>;

    /// Full message log, oldest first.
    async fn list_messages(&self, conversation_id: Uuid)
    -> Result<Vec<StoredMessage>, DatabaseError>;

    /// The last `limit` messages, oldest first.
    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DatabaseError>;
}
