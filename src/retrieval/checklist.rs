//! Checklist generation from retrieved content.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CallParams;
use crate::error::AssistantError;
use crate::knowledge::{KnowledgeItem, KnowledgeKind, KnowledgeStore};
use crate::llm::{ChatMessage, CompletionRequest, ModelGateway};
use crate::retrieval::payload::extract_structured_payload;
use crate::retrieval::prompts;

/// Source label for items stored without a URL.
pub const UNKNOWN_SOURCE: &str = "Unknown Source";

/// One retrieved step, copied from a content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistStep {
    pub text: String,
    pub details: Vec<String>,
    pub pdf_links: Vec<String>,
    pub source: String,
}

/// Retrieved steps plus the model's formatted version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub query: String,
    pub steps: Vec<ChecklistStep>,
    /// Instruction lines written by the model.
    pub instructions: Vec<String>,
    /// PDF links the model chose to highlight.
    pub pdf_links: Vec<String>,
    pub source: Option<String>,
    pub closing: String,
}

/// Shape the model is asked to return.
#[derive(Debug, Deserialize)]
struct FormattedChecklist {
    steps: Vec<String>,
    closing: String,
    #[serde(default)]
    pdf_links: Vec<String>,
    #[serde(default)]
    source: Option<String>,
}

pub struct ChecklistGenerator {
    gateway: Arc<ModelGateway>,
    store: Arc<dyn KnowledgeStore>,
    params: CallParams,
    top_k: usize,
}

impl ChecklistGenerator {
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

    /// Retrieve steps for `query` and have the model format them.
    pub async fn generate(&self, query: &str) -> Result<Checklist, AssistantError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AssistantError::InvalidInput(
                "checklist query must not be empty".to_string(),
            ));
        }

        let steps = self.retrieve_steps(query).await?;
        if steps.is_empty() {
            return Err(AssistantError::NoDataFound {
                query: query.to_string(),
            });
        }
        debug!(steps = steps.len(), "Checklist steps retrieved");

        let request = CompletionRequest::new(vec![ChatMessage::user(
            prompts::checklist_user_message(query, &steps),
        )])
        .with_system_prompt(prompts::checklist_system_prompt())
        .with_max_tokens(self.params.max_tokens)
        .with_temperature(self.params.temperature);

        let raw = self.gateway.complete(request).await?;
        let payload = extract_structured_payload(&raw)?;
        let formatted: FormattedChecklist =
            serde_json::from_value(serde_json::Value::Object(payload)).map_err(|e| {
                AssistantError::MalformedModelOutput {
                    reason: format!("unexpected checklist shape: {e}"),
                }
            })?;

        info!(
            steps = steps.len(),
            instructions = formatted.steps.len(),
            "Checklist generated"
        );

        Ok(Checklist {
            query: query.to_string(),
            steps,
            instructions: formatted.steps,
            pdf_links: formatted.pdf_links,
            source: formatted.source.filter(|s| !s.trim().is_empty()),
            closing: formatted.closing,
        })
    }

    /// One step per content hit with usable text. Links and source are kept verbatim.
    async fn retrieve_steps(&self, query: &str) -> Result<Vec<ChecklistStep>, AssistantError> {
        let hits = self
            .store
            .search(query, self.top_k, Some(KnowledgeKind::Content))
            .await?;

        let steps = hits
            .into_iter()
            .filter_map(|hit| match hit.item {
                KnowledgeItem::Content {
                    text,
                    summary,
                    pdf_links,
                    source_url,
                } => {
                    let step = if summary.trim().is_empty() {
                        text.trim().to_string()
                    } else {
                        summary.trim().to_string()
                    };
                    if step.is_empty() {
                        return None;
                    }
                    Some(ChecklistStep {
                        details: vec![step.clone()],
                        text: step,
                        pdf_links,
                        source: if source_url.is_empty() {
                            UNKNOWN_SOURCE.to_string()
                        } else {
                            source_url
                        },
                    })
                }
                _ => None,
            })
            .collect();
        Ok(steps)
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

    async fn generator(llm: Arc<ScriptedLlm>, items: &[KnowledgeItem]) -> ChecklistGenerator {
        let backend = LibSqlBackend::new_memory().await.unwrap();
        let store = LibSqlKnowledgeStore::new(backend.connection(), Arc::new(HashEmbedder::new()));
        for item in items {
            store.insert(item).await.unwrap();
        }
        let config = AssistantConfig::default();
        let gateway = ModelGateway::new(llm).with_default_timeout(Duration::from_millis(50));
        ChecklistGenerator::new(
            Arc::new(gateway),
            Arc::new(store),
            config.checklist,
            config.checklist_top_k,
        )
    }

    fn content(text: &str, summary: &str, pdf_links: &[&str], source: &str) -> KnowledgeItem {
        KnowledgeItem::Content {
            text: text.into(),
            summary: summary.into(),
            pdf_links: pdf_links.iter().map(|s| s.to_string()).collect(),
            source_url: source.into(),
        }
    }

    const FORMATTED: &str =
        r#"{"steps": ["Step 1: Book an appointment."], "closing": "Bring your passport."}"#;

    #[tokio::test]
    async fn empty_query_is_invalid_without_model_call() {
        let llm = Arc::new(ScriptedLlm::always(FORMATTED));
        let g = generator(llm.clone(), &[]).await;
        for query in ["", "   \n"] {
            assert!(matches!(
                g.generate(query).await,
                Err(AssistantError::InvalidInput(_))
            ));
        }
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn empty_store_is_no_data() {
        let llm = Arc::new(ScriptedLlm::always(FORMATTED));
        let g = generator(llm.clone(), &[]).await;
        assert!(matches!(
            g.generate("renew residence permit").await,
            Err(AssistantError::NoDataFound { .. })
        ));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn only_non_content_items_is_no_data() {
        let llm = Arc::new(ScriptedLlm::always(FORMATTED));
        let g = generator(
            llm,
            &[KnowledgeItem::PdfLink {
                url: "https://x/form.pdf".into(),
                source_url: "https://x".into(),
            }],
        )
        .await;
        assert!(matches!(
            g.generate("form").await,
            Err(AssistantError::NoDataFound { .. })
        ));
    }

    #[tokio::test]
    async fn links_and_source_pass_through_verbatim() {
        let llm = Arc::new(ScriptedLlm::always(FORMATTED));
        let g = generator(
            llm.clone(),
            &[content(
                "Residence permits are renewed at the foreigners office.",
                "Renew your residence permit",
                &["a.pdf", "b.pdf"],
                "https://x",
            )],
        )
        .await;

        let checklist = g.generate("residence permit").await.unwrap();
        assert_eq!(checklist.query, "residence permit");
        assert_eq!(checklist.steps.len(), 1);
        let step = &checklist.steps[0];
        assert_eq!(step.text, "Renew your residence permit");
        assert_eq!(step.pdf_links, vec!["a.pdf".to_string(), "b.pdf".to_string()]);
        assert_eq!(step.source, "https://x");
        assert_eq!(checklist.instructions, vec!["Step 1: Book an appointment."]);
        assert_eq!(checklist.closing, "Bring your passport.");
        assert!(checklist.source.is_none());

        let request = &llm.requests()[0];
        assert_eq!(request.max_tokens, Some(600));
        assert!(request.messages[0].content.contains("PDF Links:\na.pdf\nb.pdf"));
    }

    #[tokio::test]
    async fn body_text_used_when_summary_missing_and_blank_items_skipped() {
        let llm = Arc::new(ScriptedLlm::always(FORMATTED));
        let g = generator(
            llm,
            &[
                content("Pay the permit fee online", "", &[], ""),
                content("   ", "  ", &[], "https://blank"),
            ],
        )
        .await;

        let checklist = g.generate("permit fee").await.unwrap();
        assert_eq!(checklist.steps.len(), 1);
        assert_eq!(checklist.steps[0].text, "Pay the permit fee online");
        assert_eq!(checklist.steps[0].source, UNKNOWN_SOURCE);
    }

    #[tokio::test]
    async fn extended_shape_is_accepted() {
        let llm = Arc::new(ScriptedLlm::always(
            "```json\n{\"steps\": [\"A\"], \"pdf_links\": [\"a.pdf\"], \"source\": \"https://x\", \"closing\": \"C\"}\n```",
        ));
        let g = generator(llm, &[content("permit", "permit", &["a.pdf"], "https://x")]).await;
        let checklist = g.generate("permit").await.unwrap();
        assert_eq!(checklist.pdf_links, vec!["a.pdf".to_string()]);
        assert_eq!(checklist.source.as_deref(), Some("https://x"));
    }

    #[tokio::test]
    async fn malformed_output_is_reported_once() {
        let llm = Arc::new(ScriptedLlm::always("Sorry, I can't format that."));
        let g = generator(llm.clone(), &[content("permit", "", &[], "")]).await;
        assert!(matches!(
            g.generate("permit").await,
            Err(AssistantError::MalformedModelOutput { .. })
        ));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn object_missing_fields_is_malformed() {
        let llm = Arc::new(ScriptedLlm::always(r#"{"items": []}"#));
        let g = generator(llm, &[content("permit", "", &[], "")]).await;
        assert!(matches!(
            g.generate("permit").await,
            Err(AssistantError::MalformedModelOutput { .. })
        ));
    }

    #[tokio::test]
    async fn model_failures_are_typed() {
        let g = generator(Arc::new(ScriptedLlm::failing()), &[content("permit", "", &[], "")]).await;
        let err = g.generate("permit").await.unwrap_err();
        assert!(matches!(err, AssistantError::ModelUnavailable { .. }));

        let g = generator(Arc::new(ScriptedLlm::stalling()), &[content("permit", "", &[], "")]).await;
        let err = g.generate("permit").await.unwrap_err();
        assert!(matches!(err, AssistantError::ModelTimeout { .. }));
        assert!(err.is_model_failure());
    }
}
