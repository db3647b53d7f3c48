//! Assistant: the inbound surface over dialogue and retrieval.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::AssistantConfig;
use crate::dialogue::{DialogueManager, StoredMessage, TurnOutcome};
use crate::error::AssistantError;
use crate::flows::FlowRegistry;
use crate::knowledge::KnowledgeStore;
use crate::llm::ModelGateway;
use crate::retrieval::{Checklist, ChecklistGenerator, ContactResolver};
use crate::store::Database;

/// Everything the assistant needs, injected by the caller.
pub struct AssistantDeps {
    pub db: Arc<dyn Database>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub gateway: Arc<ModelGateway>,
    pub flows: Arc<FlowRegistry>,
    pub config: AssistantConfig,
}

pub struct Assistant {
    dialogue: DialogueManager,
    checklists: ChecklistGenerator,
    contacts: ContactResolver,
}

impl Assistant {
    pub fn new(deps: AssistantDeps) -> Self {
        let AssistantDeps {
            db,
            knowledge,
            gateway,
            flows,
            config,
        } = deps;

        Self {
            dialogue: DialogueManager::new(db, gateway.clone(), flows, &config),
            checklists: ChecklistGenerator::new(
                gateway.clone(),
                knowledge.clone(),
                config.checklist,
                config.checklist_top_k,
            ),
            contacts: ContactResolver::new(gateway, knowledge, config.phone, config.phone_top_k),
        }
    }

    pub async fn handle_message(
        &self,
        conversation_id: Option<Uuid>,
        text: &str,
    ) -> Result<TurnOutcome, AssistantError> {
        self.dialogue.handle_message(conversation_id, text).await
    }

    pub async fn generate_checklist(&self, query: &str) -> Result<Checklist, AssistantError> {
        self.checklists.generate(query).await
    }

    pub async fn resolve_phone(&self, query: &str) -> Result<String, AssistantError> {
        self.contacts.resolve_phone(query).await
    }

    pub async fn generate_request(&self, conversation_id: Uuid) -> Result<String, AssistantError> {
        self.dialogue.generate_request(conversation_id).await
    }

    pub async fn transcript(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<StoredMessage>, AssistantError> {
        self.dialogue.transcript(conversation_id).await
    }
}
