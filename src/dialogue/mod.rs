//! Scripted intake dialogue: classification, state tracking and rewording.

pub mod classifier;
pub mod locks;
pub mod manager;
pub mod prompts;
pub mod rewriter;
pub mod state;

pub use classifier::IntentClassifier;
pub use locks::ConversationLocks;
pub use manager::{DialogueManager, TurnOutcome, UNSUPPORTED_PROCESS};
pub use rewriter::QuestionRewriter;
pub use state::{Conversation, ConversationPhase, MessageRole, StoredMessage};
