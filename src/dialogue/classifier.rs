//! Intent classifier: free text to a known flow id.
//!
//! The model is asked first. If it cannot be reached, keyword matching
//! against the registry decides. Whatever the model says, only a registered
//! flow id ever leaves this module.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::CallParams;
use crate::dialogue::prompts;
use crate::flows::FlowRegistry;
use crate::llm::{ChatMessage, CompletionRequest, ModelGateway};

pub struct IntentClassifier {
    gateway: Arc<ModelGateway>,
    flows: Arc<FlowRegistry>,
    params: CallParams,
}

impl IntentClassifier {
    pub fn new(gateway: Arc<ModelGateway>, flows: Arc<FlowRegistry>, params: CallParams) -> Self {
        Self {
            gateway,
            flows,
            params,
        }
    }

    /// Return the matching flow id, or `None` when no flow applies.
    pub async fn classify(&self, text: &str) -> Option<String> {
        let known = self.flows.known_flow_ids();
        let request = CompletionRequest::new(vec![ChatMessage::user(
            prompts::classification_user_message(text),
        )])
        .with_system_prompt(prompts::classification_system_prompt(&known))
        .with_max_tokens(self.params.max_tokens)
        .with_temperature(self.params.temperature);

        match self.gateway.complete(request).await {
            Ok(answer) => {
                let normalized = answer.trim().to_lowercase();
                debug!(answer = %normalized, "Flow detection answer");
                let matched = self.flows.contains(&normalized).then_some(normalized);
                if let Some(flow) = &matched {
                    info!(flow = %flow, "Flow detected");
                }
                matched
            }
            Err(e) => {
                let fallback = self.flows.match_keywords(text).map(str::to_string);
                warn!(
                    error = %e,
                    fallback = fallback.as_deref().unwrap_or("none"),
                    "Flow detection failed, using keyword fallback"
                );
                fallback
            }
        }
    }
}
