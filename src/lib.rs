//! Intake Assist: guided intake dialogues and retrieval-backed answers.

pub mod assistant;
pub mod cli;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod flows;
pub mod knowledge;
pub mod llm;
pub mod retrieval;
pub mod store;

pub use assistant::{Assistant, AssistantDeps};
pub use error::{AssistantError, Error, Result};
