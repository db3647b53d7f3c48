//! Contact resolution: the best phone number for a free-form question.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::CallParams;
use crate::error::AssistantError;
use crate::knowledge::{KnowledgeItem, KnowledgeKind, KnowledgeStore};
use crate::llm::{ChatMessage, CompletionRequest, ModelGateway};
use crate::retrieval::prompts::{self, NO_PHONE_SENTINEL};

pub struct ContactResolver {
    gateway: Arc<ModelGateway>,
    store: Arc<dyn KnowledgeStore>,
    params: CallParams,
    top_k: usize,
}

impl ContactResolver {
    pub fn new(
        gateway: Arc<ModelGateway>,
        store: Arc<dyn KnowledgeStore>,
        params: CallParams,
        top_k: usize,
    ) -> Self {
        Self {
            gateway,
            store,
            params,
            top_k,
        }
    }

    /// Return a phone number for `query`, or [`NO_PHONE_SENTINEL`].
    ///
    /// The model is not called when no phone numbers are stored.
    pub async fn resolve_phone(&self, query: &str) -> Result<String, AssistantError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AssistantError::InvalidInput(
                "phone query must not be empty".to_string(),
            ));
        }

        let hits = self
            .store
            .search(query, self.top_k, Some(KnowledgeKind::PhoneNumber))
            .await?;

        let candidates: Vec<(String, String, String)> = hits
            .into_iter()
            .filter_map(|hit| match hit.item {
                KnowledgeItem::PhoneNumber {
                    number,
                    left_context,
                    right_context,
                    source_url,
                } => Some((
                    number,
                    format!("{} ... {}", left_context.trim(), right_context.trim()),
                    source_url,
                )),
                _ => None,
            })
            .collect();

        if candidates.is_empty() {
            info!("No phone numbers stored for query");
            return Ok(NO_PHONE_SENTINEL.to_string());
        }
        debug!(candidates = candidates.len(), "Phone candidates retrieved");

        let request = CompletionRequest::new(vec![ChatMessage::user(
            prompts::phone_user_message(query, &candidates),
        )])
        .with_system_prompt(prompts::phone_system_prompt())
        .with_max_tokens(self.params.max_tokens)
        .with_temperature(self.params.temperature);

        let answer = self.gateway.complete(request).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(NO_PHONE_SENTINEL.to_string());
        }
        Ok(answer.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::AssistantConfig;
    use crate::knowledge::{HashEmbedder, LibSqlKnowledgeStore};
    use crate::llm::testing::ScriptedLlm;
    use crate::store::LibSqlBackend;

    async fn resolver(llm: Arc<ScriptedLlm>, items: &[KnowledgeItem]) -> ContactResolver {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let store = LibSqlKnowledgeStore::new(backend.connection(), Arc::new(HashEmbedder::new()));
        for item in items {
            store.insert(item).await.unwrap();
        }
        let config = AssistantConfig::default();
        let gateway = ModelGateway::new(llm).with_default_timeout(Duration::from_millis(50));
        ContactResolver::new(Arc::new(gateway), Arc::new(store), config.phone, config.phone_top_k)
    }

    fn phone(number: &str, left: &str) -> KnowledgeItem {
        KnowledgeItem::PhoneNumber {
            number: number.into(),
            left_context: left.into(),
            right_context: "Mon-Fri 8-12".into(),
            source_url: "https://stadt.example/kvr".into(),
        }
    }

    #[tokio::test]
    async fn empty_store_returns_sentinel_without_model_call() {
        let llm = Arc::new(ScriptedLlm::always("+49000"));
        let r = resolver(llm.clone(), &[]).await;
        assert_eq!(r.resolve_phone("immigration office").await.unwrap(), NO_PHONE_SENTINEL);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn content_only_store_returns_sentinel() {
        let llm = Arc::new(ScriptedLlm::always("+49000"));
        let r = resolver(
            llm.clone(),
            &[KnowledgeItem::Content {
                text: "Call the immigration office".into(),
                summary: String::new(),
                pdf_links: vec![],
                source_url: String::new(),
            }],
        )
        .await;
        assert_eq!(r.resolve_phone("immigration office").await.unwrap(), NO_PHONE_SENTINEL);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn returns_trimmed_model_choice() {
        let llm = Arc::new(ScriptedLlm::always("  +498923396010\n"));
        let r = resolver(llm.clone(), &[phone("+498923396010", "Foreigners office hotline")]).await;
        assert_eq!(r.resolve_phone("foreigners office").await.unwrap(), "+498923396010");

        let request = &llm.requests()[0];
        assert!(request.messages[0].content.contains("+498923396010"));
        assert!(request.messages[0].content.contains("https://stadt.example/kvr"));
    }

    #[tokio::test]
    async fn model_sentinel_is_passed_through() {
        let llm = Arc::new(ScriptedLlm::always(NO_PHONE_SENTINEL));
        let r = resolver(llm, &[phone("+4989111", "Dog registration")]).await;
        assert_eq!(r.resolve_phone("visa").await.unwrap(), NO_PHONE_SENTINEL);
    }

    #[tokio::test]
    async fn blank_model_answer_becomes_sentinel() {
        let llm = Arc::new(ScriptedLlm::always("  "));
        let r = resolver(llm, &[phone("+4989111", "office")]).await;
        assert_eq!(r.resolve_phone("office").await.unwrap(), NO_PHONE_SENTINEL);
    }

    #[tokio::test]
    async fn empty_query_is_invalid() {
        let r = resolver(Arc::new(ScriptedLlm::failing()), &[]).await;
        assert!(matches!(
            r.resolve_phone(" ").await,
            Err(AssistantError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn model_failures_are_typed() {
        let r = resolver(Arc::new(ScriptedLlm::stalling()), &[phone("+4989111", "office")]).await;
        assert!(matches!(
            r.resolve_phone("office").await,
            Err(AssistantError::ModelTimeout { .. })
        ));

        let r = resolver(Arc::new(ScriptedLlm::failing()), &[phone("+4989111", "office")]).await;
        assert!(matches!(
            r.resolve_phone("office").await,
            Err(AssistantError::ModelUnavailable { .. })
        ));
    }
}
