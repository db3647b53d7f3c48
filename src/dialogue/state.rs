//! Conversation state machine: phases, conversation rows and message log types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The persisted phases of an intake conversation.
///
/// A message without a conversation id has no row yet; once a flow matches,
/// the conversation is created `InProgress` and only ever moves to `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    InProgress,
    Finished,
}

impl ConversationPhase {
    /// Whether this phase is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Parse the persisted status column.
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConversationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
        };
        write!(f, "{s}")
    }
}

/// A persisted traversal of one flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub flow_type: String,
    /// Index of the last question asked.
    pub state_index: u32,
    pub phase: ConversationPhase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// What to do with the next user answer, given the flow length.
    pub fn next_step(&self, flow_len: usize) -> NextStep {
        let next = self.state_index as usize + 1;
        if next < flow_len {
            NextStep::Ask(next)
        } else {
            NextStep::Finish
        }
    }
}

/// Outcome of [`Conversation::next_step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Ask the question at this index.
    Ask(usize),
    /// All questions have been asked; synthesize the request.
    Finish,
}

/// Author of a logged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Capitalized label used in transcripts fed to the model.
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// One entry of a conversation's append-only message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    /// Monotonic insertion sequence; the log is ordered by this.
    pub seq: i64,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Render messages as `Role: content` lines, oldest first.
pub fn format_transcript(messages: &[StoredMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
