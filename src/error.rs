//! Error types for Intake Assist.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Knowledge store error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("Assistant error: {0}")]
    Assistant(#[from] AssistantError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid request for {provider}: {reason}")]
    InvalidRequest { provider: String, reason: String },
}

/// Knowledge store errors.
#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("Embedding generation failed: {reason}")]
    EmbeddingFailed { reason: String },

    #[error("Invalid knowledge record: {0}")]
    InvalidRecord(String),

    #[error(
        "Stored embeddings come from '{stored}' but the active embedder is '{active}'; re-ingest the knowledge base"
    )]
    EmbedderMismatch { stored: String, active: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Errors surfaced by the dialogue and retrieval core.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No data found for query: {query}")]
    NoDataFound { query: String },

    #[error("Model unavailable: {reason}")]
    ModelUnavailable { reason: String },

    #[error("Model timed out after {timeout:?}")]
    ModelTimeout { timeout: Duration },

    #[error("Malformed model output: {reason}")]
    MalformedModelOutput { reason: String },

    #[error("Flow {flow_type} is not registered")]
    UnknownFlow { flow_type: String },

    #[error("Conversation {id} not found")]
    ConversationNotFound { id: Uuid },

    #[error("Conversation {id} is already finished")]
    ConversationFinished { id: Uuid },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Knowledge store error: {0}")]
    Knowledge(#[from] KnowledgeError),
}

impl AssistantError {
    /// Whether this error came from the model boundary (unavailable or timed out).
    pub fn is_model_failure(&self) -> bool {
        matches!(self, Self::ModelUnavailable { .. } | Self::ModelTimeout { .. })
    }
}

impl From<LlmError> for AssistantError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout { timeout, .. } => Self::ModelTimeout { timeout },
            other => Self::ModelUnavailable {
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
