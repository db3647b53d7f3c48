//! DialogueManager: drives a conversation through its flow.
//!
//! A message without a conversation id is classified and may open a new
//! conversation. A message for an existing conversation records the answer
//! and either asks the next scripted question or, after the last one,
//! synthesizes the request and finishes the conversation.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AssistantConfig;
use crate::dialogue::classifier::IntentClassifier;
use crate::dialogue::locks::ConversationLocks;
use crate::dialogue::rewriter::QuestionRewriter;
use crate::dialogue::state::{Conversation, MessageRole, NextStep, StoredMessage};
use crate::error::AssistantError;
use crate::flows::FlowRegistry;
use crate::llm::ModelGateway;
use crate::store::Database;

/// Reply used when no flow matches the user's request.
pub const UNSUPPORTED_PROCESS: &str = "Thanks for your request. Unfortunately, we do not yet \
support this process. We may add it in a future release.";

/// Result of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    /// `None` only when no conversation was created.
    pub conversation_id: Option<Uuid>,
    pub response: String,
    pub finished: bool,
}

pub struct DialogueManager {
    db: Arc<dyn Database>,
    flows: Arc<FlowRegistry>,
    classifier: IntentClassifier,
    rewriter: QuestionRewriter,
    locks: ConversationLocks,
    context_messages: usize,
}

impl DialogueManager {
    pub fn new(
        db: Arc<dyn Database>,
        gateway: Arc<ModelGateway>,
        flows: Arc<FlowRegistry>,
        config: &AssistantConfig,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(gateway.clone(), flows.clone(), config.classify),
            rewriter: QuestionRewriter::new(gateway, config.reword, config.request),
            db,
            flows,
            locks: ConversationLocks::new(),
            context_messages: config.reword_context_messages,
        }
    }

    /// Process one user message.
    pub async fn handle_message(
        &self,
        conversation_id: Option<Uuid>,
        text: &str,
    ) -> Result<TurnOutcome, AssistantError> {
        if text.trim().is_empty() {
            return Err(AssistantError::InvalidInput(
                "message text must not be empty".to_string(),
            ));
        }

        match conversation_id {
            None => self.start(text).await,
            Some(id) => self.continue_conversation(id, text).await,
        }
    }

    /// Synthesize a request from whatever has been collected so far.
    ///
    /// Does not change the conversation.
    pub async fn generate_request(&self, conversation_id: Uuid) -> Result<String, AssistantError> {
        self.load(conversation_id).await?;
        let messages = self.db.list_messages(conversation_id).await?;
        Ok(self.rewriter.synthesize_request(&messages).await)
    }

    /// The conversation's message log, oldest first.
    pub async fn transcript(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<StoredMessage>, AssistantError> {
        self.load(conversation_id).await?;
        Ok(self.db.list_messages(conversation_id).await?)
    }

    pub async fn conversation(&self, conversation_id: Uuid) -> Result<Conversation, AssistantError> {
        self.load(conversation_id).await
    }

    // ── Transitions ─────────────────────────────────────────────────

    async fn start(&self, text: &str) -> Result<TurnOutcome, AssistantError> {
        let Some(flow_type) = self.classifier.classify(text).await else {
            info!("No flow matched, replying with unsupported notice");
            return Ok(TurnOutcome {
                conversation_id: None,
                response: UNSUPPORTED_PROCESS.to_string(),
                finished: true,
            });
        };

        let questions = self.questions(&flow_type)?;
        let first = questions.first().cloned().ok_or_else(|| AssistantError::UnknownFlow {
            flow_type: flow_type.clone(),
        })?;

        let conversation = self.db.create_conversation(&flow_type).await?;
        let _guard = self.locks.acquire(conversation.id).await;
        info!(id = %conversation.id, flow = %flow_type, "Conversation started");

        self.db
            .append_message(conversation.id, MessageRole::User, text)
            .await?;
        let question = self.reword(conversation.id, &first).await?;
        self.db
            .append_message(conversation.id, MessageRole::Assistant, &question)
            .await?;

        Ok(TurnOutcome {
            conversation_id: Some(conversation.id),
            response: question,
            finished: false,
        })
    }

    async fn continue_conversation(
        &self,
        id: Uuid,
        text: &str,
    ) -> Result<TurnOutcome, AssistantError> {
        let _guard = self.locks.acquire(id).await;

        let conversation = self.load(id).await?;
        if conversation.phase.is_terminal() {
            return Err(AssistantError::ConversationFinished { id });
        }
        let questions = self.questions(&conversation.flow_type)?;

        match conversation.next_step(questions.len()) {
            NextStep::Ask(index) => {
                let (state_index, _) = self
                    .db
                    .advance_conversation(id, conversation.state_index, text)
                    .await?;
                debug!(%id, state_index, "Conversation advanced");

                let question = self.reword(id, &questions[index]).await?;
                self.db
                    .append_message(id, MessageRole::Assistant, &question)
                    .await?;

                Ok(TurnOutcome {
                    conversation_id: Some(id),
                    response: question,
                    finished: false,
                })
            }
            NextStep::Finish => {
                let mut messages = self.db.list_messages(id).await?;
                messages.push(pending_answer(id, text, &messages));
                let request = self.rewriter.synthesize_request(&messages).await;
                self.db
                    .finish_conversation(id, conversation.state_index, text, &request)
                    .await?;
                info!(%id, flow = %conversation.flow_type, "Conversation finished");

                Ok(TurnOutcome {
                    conversation_id: Some(id),
                    response: request,
                    finished: true,
                })
            }
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    async fn load(&self, id: Uuid) -> Result<Conversation, AssistantError> {
        self.db
            .get_conversation(id)
            .await?
            .ok_or(AssistantError::ConversationNotFound { id })
    }

    fn questions(&self, flow_type: &str) -> Result<Vec<String>, AssistantError> {
        self.flows
            .questions(flow_type)
            .map(|q| q.to_vec())
            .ok_or_else(|| AssistantError::UnknownFlow {
                flow_type: flow_type.to_string(),
            })
    }

    async fn reword(&self, id: Uuid, raw_question: &str) -> Result<String, AssistantError> {
        let recent = self.db.recent_messages(id, self.context_messages).await?;
        Ok(self.rewriter.reword(raw_question, &recent).await)
    }
}

/// The final answer as it will be logged, for synthesis before it is written.
fn pending_answer(conversation_id: Uuid, text: &str, logged: &[StoredMessage]) -> StoredMessage {
    StoredMessage {
        id: Uuid::new_v4(),
        conversation_id,
        seq: logged.last().map_or(1, |m| m.seq + 1),
        role: MessageRole::User,
        content: text.to_string(),
        created_at: Utc::now(),
    }
}
