//! Question rewriter and request synthesizer.
//!
//! Both turn scripted or logged text into natural language through the
//! model and fall back to deterministic text when the model fails, so a
//! dialogue transition never fails because of them.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::CallParams;
use crate::dialogue::prompts;
use crate::dialogue::state::{MessageRole, StoredMessage, format_transcript};
use crate::llm::{ChatMessage, CompletionRequest, ModelGateway};

/// Returned when there is nothing to summarize.
pub const NO_MESSAGES_NOTICE: &str = "No messages to generate a request.";

/// First line of the request fallback.
pub const REQUEST_FALLBACK_NOTICE: &str =
    "Automatic request generation failed. Here is what you told us so far:";

pub struct QuestionRewriter {
    gateway: Arc<ModelGateway>,
    reword: CallParams,
    request: CallParams,
}

impl QuestionRewriter {
    pub fn new(gateway: Arc<ModelGateway>, reword: CallParams, request: CallParams) -> Self {
        Self {
            gateway,
            reword,
            request,
        }
    }

    /// Rephrase `raw_question` given the recent messages (oldest first).
    ///
    /// Falls back to `raw_question` on model failure or empty output.
    pub async fn reword(&self, raw_question: &str, recent: &[StoredMessage]) -> String {
        let context = format_transcript(recent);
        let request = CompletionRequest::new(vec![ChatMessage::user(
            prompts::reword_user_message(raw_question),
        )])
        .with_system_prompt(prompts::reword_system_prompt(&context))
        .with_max_tokens(self.reword.max_tokens)
        .with_temperature(self.reword.temperature);

        match self.gateway.complete(request).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("Rewriter returned empty text, using raw question");
                raw_question.to_string()
            }
            Err(e) => {
                warn!(error = %e, "Rewriter failed, using raw question");
                raw_question.to_string()
            }
        }
    }

    /// Write a first-person request from the whole transcript.
    ///
    /// On model failure the user's own answers are listed instead.
    pub async fn synthesize_request(&self, transcript: &[StoredMessage]) -> String {
        if transcript.is_empty() {
            return NO_MESSAGES_NOTICE.to_string();
        }

        let rendered = format_transcript(transcript);
        debug!(messages = transcript.len(), chars = rendered.len(), "Synthesizing request");

        let request = CompletionRequest::new(vec![ChatMessage::user(
            prompts::request_user_message(&rendered),
        )])
        .with_system_prompt(prompts::request_system_prompt())
        .with_max_tokens(self.request.max_tokens)
        .with_temperature(self.request.temperature);

        match self.gateway.complete(request).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("Request synthesis returned empty text, using fallback");
                fallback_request(transcript)
            }
            Err(e) => {
                warn!(error = %e, "Request synthesis failed, using fallback");
                fallback_request(transcript)
            }
        }
    }
}

/// Failure notice followed by every user message as a bullet, in order.
pub fn fallback_request(transcript: &[StoredMessage]) -> String {
    let mut out = String::from(REQUEST_FALLBACK_NOTICE);
    for message in transcript.iter().filter(|m| m.role == MessageRole::User) {
        out.push_str("\n- ");
        out.push_str(&message.content);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use uuid::Uuid;

    use crate::config::AssistantConfig;
    use crate::llm::testing::ScriptedLlm;

    fn rewriter(llm: Arc<ScriptedLlm>) -> QuestionRewriter {
        let config = AssistantConfig::default();
        let gateway = ModelGateway::new(llm).with_default_timeout(Duration::from_millis(50));
        QuestionRewriter::new(Arc::new(gateway), config.reword, config.request)
    }

    fn messages(pairs: &[(MessageRole, &str)]) -> Vec<StoredMessage> {
        let cid = Uuid::new_v4();
        pairs
            .iter()
            .enumerate()
            .map(|(i, (role, content))| StoredMessage {
                id: Uuid::new_v4(),
                conversation_id: cid,
                seq: i as i64 + 1,
                role: *role,
                content: content.to_string(),
                created_at: Utc::now(),
            })
            .collect()
    }

    #[tokio::test]
    async fn reword_returns_trimmed_model_text() {
        let llm = Arc::new(ScriptedLlm::always("  Which country are you a citizen of? \n"));
        let recent = messages(&[(MessageRole::User, "Residence permit")]);
        let text = rewriter(llm.clone())
            .reword("What is your nationality?", &recent)
            .await;
        assert_eq!(text, "Which country are you a citizen of?");

        let request = &llm.requests()[0];
        assert_eq!(request.max_tokens, Some(120));
        assert_eq!(request.temperature, Some(0.3));
        assert!(request.system_prompt.as_deref().unwrap().contains("User: Residence permit"));
    }

    #[tokio::test]
    async fn reword_falls_back_on_failure_timeout_and_empty_output() {
        for llm in [
            ScriptedLlm::failing(),
            ScriptedLlm::stalling(),
            ScriptedLlm::always("   "),
        ] {
            let text = rewriter(Arc::new(llm)).reword("What is your nationality?", &[]).await;
            assert_eq!(text, "What is your nationality?");
        }
    }

    #[tokio::test]
    async fn request_uses_model_text() {
        let llm = Arc::new(ScriptedLlm::always("I would like to extend my visa. What do I need to do next?"));
        let transcript = messages(&[
            (MessageRole::User, "extend my visa"),
            (MessageRole::Assistant, "What permit do you hold?"),
            (MessageRole::User, "Residence permit"),
        ]);
        let text = rewriter(llm.clone()).synthesize_request(&transcript).await;
        assert!(text.starts_with("I would like"));

        let request = &llm.requests()[0];
        assert_eq!(request.max_tokens, Some(400));
        assert!(request.messages[0].content.contains("Assistant: What permit do you hold?"));
    }

    #[tokio::test]
    async fn request_fallback_lists_user_messages_in_order() {
        let transcript = messages(&[
            (MessageRole::User, "extend my visa"),
            (MessageRole::Assistant, "What permit do you hold?"),
            (MessageRole::User, "Residence permit"),
            (MessageRole::Assistant, "Nationality?"),
            (MessageRole::User, "Brazilian"),
        ]);
        let text = rewriter(Arc::new(ScriptedLlm::stalling()))
            .synthesize_request(&transcript)
            .await;
        assert_eq!(
            text,
            format!(
                "{REQUEST_FALLBACK_NOTICE}\n- extend my visa\n- Residence permit\n- Brazilian"
            )
        );
    }

    #[tokio::test]
    async fn empty_transcript_skips_model() {
        let llm = Arc::new(ScriptedLlm::always("unused"));
        let text = rewriter(llm.clone()).synthesize_request(&[]).await;
        assert_eq!(text, NO_MESSAGES_NOTICE);
        assert_eq!(llm.calls(), 0);
    }
}
