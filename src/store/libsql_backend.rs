//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. The knowledge store shares
//! this backend's connection (see [`LibSqlBackend::connection`]); writers on
//! that connection serialize through [`SharedConnection::lock_writes`] so a
//! transaction never picks up another task's statements.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dialogue::state::{Conversation, ConversationPhase, MessageRole, StoredMessage};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::Database;

/// A libSQL connection plus the lock that serializes writes on it.
///
/// A transaction spans the whole connection, so every writer holding a clone
/// of this handle takes the write lock first.
#[derive(Clone)]
pub struct SharedConnection {
    conn: Connection,
    writes: Arc<Mutex<()>>,
}

impl SharedConnection {
    fn new(conn: Connection) -> Self {
        Self {
            conn,
            writes: Arc::new(Mutex::new(())),
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Hold the returned guard for the duration of a write or transaction.
    pub async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().await
    }
}

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    shared: SharedConnection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            shared: SharedConnection::new(conn),
        })
    }

    /// A handle to the shared connection.
    ///
    /// In-memory databases are per-connection, so other stores must reuse
    /// this handle rather than calling `connect()` again.
    pub fn connection(&self) -> SharedConnection {
        self.shared.clone()
    }

    fn conn(&self) -> &Connection {
        self.shared.conn()
    }

    /// Explain why a guarded update on `id` touched no row.
    async fn conflict(&self, id: Uuid, expected: u32) -> DatabaseError {
        match self.get_conversation(id).await {
            Err(e) => e,
            Ok(None) => DatabaseError::NotFound {
                entity: "conversation".to_string(),
                id: id.to_string(),
            },
            Ok(Some(current)) => DatabaseError::Constraint(format!(
                "conversation {id} is at state_index {} ({}), expected {expected}",
                current.state_index, current.phase
            )),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str, column: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("bad {column} '{s}': {e}")))
}

const CONVERSATION_COLUMNS: &str = "id, flow_type, state_index, status, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "seq, id, conversation_id, role, content, created_at";

/// Map a libsql Row to a Conversation.
///
/// Column order matches CONVERSATION_COLUMNS.
fn row_to_conversation(row: &libsql::Row) -> Result<Conversation, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("read conversation row: {e}"));

    let id_str: String = row.get(0).map_err(read)?;
    let flow_type: String = row.get(1).map_err(read)?;
    let state_index: i64 = row.get(2).map_err(read)?;
    let status: String = row.get(3).map_err(read)?;
    let created_str: String = row.get(4).map_err(read)?;
    let updated_str: String = row.get(5).map_err(read)?;

    let phase = ConversationPhase::from_db(&status)
        .ok_or_else(|| DatabaseError::Serialization(format!("unknown conversation status '{status}'")))?;
    let state_index = u32::try_from(state_index)
        .map_err(|_| DatabaseError::Serialization(format!("invalid state_index {state_index}")))?;

    Ok(Conversation {
        id: parse_uuid(&id_str, "conversation id")?,
        flow_type,
        state_index,
        phase,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a StoredMessage.
///
/// Column order matches MESSAGE_COLUMNS.
fn row_to_message(row: &libsql::Row) -> Result<StoredMessage, DatabaseError> {
    let read = |e: libsql::Error| DatabaseError::Query(format!("read message row: {e}"));

    let seq: i64 = row.get(0).map_err(read)?;
    let id_str: String = row.get(1).map_err(read)?;
    let conversation_str: String = row.get(2).map_err(read)?;
    let role_str: String = row.get(3).map_err(read)?;
    let content: String = row.get(4).map_err(read)?;
    let created_str: String = row.get(5).map_err(read)?;

    let role = MessageRole::from_db(&role_str)
        .ok_or_else(|| DatabaseError::Serialization(format!("unknown message role '{role_str}'")))?;

    Ok(StoredMessage {
        id: parse_uuid(&id_str, "message id")?,
        conversation_id: parse_uuid(&conversation_str, "conversation id")?,
        seq,
        role,
        content,
        created_at: parse_datetime(&created_str),
    })
}

/// Insert one message on `conn` (a plain connection or an open transaction).
async fn insert_message(
    conn: &Connection,
    conversation_id: Uuid,
    role: MessageRole,
    content: &str,
) -> Result<StoredMessage, DatabaseError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    let mut rows = conn
        .query(
            "INSERT INTO conversation_messages (id, conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING seq",
            params![
                id.to_string(),
                conversation_id.to_string(),
                role.as_str(),
                content,
                now.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("append_message: {e}")))?;

    let seq: i64 = match rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("append_message: {e}")))?
    {
        Some(row) => row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("append_message seq: {e}")))?,
        None => {
            return Err(DatabaseError::Query(
                "append_message: insert returned no sequence".to_string(),
            ));
        }
    };

    Ok(StoredMessage {
        id,
        conversation_id,
        seq,
        role,
        content: content.to_string(),
        created_at: now,
    })
}

fn tx_error(op: &'static str) -> impl Fn(libsql::Error) -> DatabaseError {
    move |e| DatabaseError::Query(format!("{op}: {e}"))
}

/// Roll back after a failed statement; the statement's error is what surfaces.
async fn rollback_quietly(tx: libsql::Transaction, op: &'static str) {
    if let Err(e) = tx.rollback().await {
        warn!(op, error = %e, "Rollback failed");
    }
}

async fn collect_messages(mut rows: libsql::Rows) -> Result<Vec<StoredMessage>, DatabaseError> {
    let mut messages = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("iterate messages: {e}")))?
    {
        messages.push(row_to_message(&row)?);
    }
    Ok(messages)
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Conversations ───────────────────────────────────────────────

    async fn create_conversation(&self, flow_type: &str) -> Result<Conversation, DatabaseError> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            flow_type: flow_type.to_string(),
            state_index: 0,
            phase: ConversationPhase::InProgress,
            created_at: now,
            updated_at: now,
        };

        let _write = self.shared.lock_writes().await;
        self.conn()
            .execute(
                "INSERT INTO conversations (id, flow_type, state_index, status, created_at, updated_at)
                 VALUES (?1, ?2, 0, ?3, ?4, ?4)",
                params![
                    conversation.id.to_string(),
                    flow_type,
                    conversation.phase.to_string(),
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_conversation: {e}")))?;

        debug!(id = %conversation.id, flow_type, "Conversation created");
        Ok(conversation)
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_conversation: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_conversation: {e}")))?
        {
            Some(row) => Ok(Some(row_to_conversation(&row)?)),
            None => Ok(None),
        }
    }

    async fn advance_conversation(
        &self,
        id: Uuid,
        expected: u32,
        answer: &str,
    ) -> Result<(u32, StoredMessage), DatabaseError> {
        let _write = self.shared.lock_writes().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(tx_error("advance_conversation begin"))?;

        let updated = tx
            .execute(
                "UPDATE conversations SET state_index = state_index + 1, updated_at = ?3
                 WHERE id = ?1 AND state_index = ?2 AND status = 'in_progress'",
                params![id.to_string(), i64::from(expected), Utc::now().to_rfc3339()],
            )
            .await
            .map_err(tx_error("advance_conversation"))?;

        if updated != 1 {
            tx.rollback()
                .await
                .map_err(tx_error("advance_conversation rollback"))?;
            return Err(self.conflict(id, expected).await);
        }

        let message = match insert_message(&tx, id, MessageRole::User, answer).await {
            Ok(message) => message,
            Err(e) => {
                rollback_quietly(tx, "advance_conversation").await;
                return Err(e);
            }
        };
        tx.commit()
            .await
            .map_err(tx_error("advance_conversation commit"))?;
        Ok((expected + 1, message))
    }

    async fn finish_conversation(
        &self,
        id: Uuid,
        expected: u32,
        answer: &str,
        request: &str,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        let _write = self.shared.lock_writes().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(tx_error("finish_conversation begin"))?;

        let updated = tx
            .execute(
                "UPDATE conversations SET status = 'finished', updated_at = ?3
                 WHERE id = ?1 AND state_index = ?2 AND status = 'in_progress'",
                params![id.to_string(), i64::from(expected), Utc::now().to_rfc3339()],
            )
            .await
            .map_err(tx_error("finish_conversation"))?;

        if updated != 1 {
            tx.rollback()
                .await
                .map_err(tx_error("finish_conversation rollback"))?;
            return Err(self.conflict(id, expected).await);
        }

        let written = async {
            Ok::<_, DatabaseError>(vec![
                insert_message(&tx, id, MessageRole::User, answer).await?,
                insert_message(&tx, id, MessageRole::Assistant, request).await?,
            ])
        }
        .await;
        let messages = match written {
            Ok(messages) => messages,
            Err(e) => {
                rollback_quietly(tx, "finish_conversation").await;
                return Err(e);
            }
        };
        tx.commit()
            .await
            .map_err(tx_error("finish_conversation commit"))?;
        Ok(messages)
    }

    // ── Messages ────────────────────────────────────────────────────

    async fn append_message(
        &self,
        conversation_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<StoredMessage, DatabaseError> {
        let _write = self.shared.lock_writes().await;
        insert_message(self.conn(), conversation_id, role, content).await
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM conversation_messages
                     WHERE conversation_id = ?1 ORDER BY seq ASC"
                ),
                params![conversation_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?;

        collect_messages(rows).await
    }

    async fn recent_messages(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM conversation_messages
                     WHERE conversation_id = ?1 ORDER BY seq DESC LIMIT ?2"
                ),
                params![conversation_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("recent_messages: {e}")))?;

        let mut messages = collect_messages(rows).await?;
        messages.reverse();
        Ok(messages)
    }
}
