//! Bridges rig-core's `CompletionModel` streaming API to our `LlmProvider`.

use async_trait::async_trait;
use futures::StreamExt;
use futures::future;
use rig::completion::{CompletionModel, Message};
use rig::streaming::StreamedAssistantContent;

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider, Role, TokenStream};

/// Adapter wrapping any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: &'static str,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
        }
    }
}

fn to_rig_message(message: &ChatMessage) -> Message {
    match message.role {
        Role::User => Message::user(message.content.clone()),
        Role::Assistant => Message::assistant(message.content.clone()),
    }
}

/// Split our message list into rig's (prompt, history) shape.
///
/// rig treats the final user turn as the prompt; everything before it is
/// chat history.
fn split_prompt(messages: &[ChatMessage]) -> Option<(Message, Vec<Message>)> {
    let (last, history) = messages.split_last()?;
    if last.role != Role::User {
        return None;
    }
    Some((
        to_rig_message(last),
        history.iter().map(to_rig_message).collect(),
    ))
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
    M::StreamingResponse: Send + 'static,
{
    fn provider_name(&self) -> &str {
        self.provider
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn stream(&self, request: CompletionRequest) -> Result<TokenStream, LlmError> {
        let (prompt, history) =
            split_prompt(&request.messages).ok_or_else(|| LlmError::InvalidRequest {
                provider: self.provider.to_string(),
                reason: "request must end with a user message".to_string(),
            })?;

        let mut builder = self.model.completion_request(prompt).messages(history);
        if let Some(system) = request.system_prompt {
            builder = builder.preamble(system);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder.stream().await.map_err(|e| LlmError::Unavailable {
            provider: self.provider.to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(
            provider = self.provider,
            model = %self.model_name,
            "Opened completion stream"
        );

        let provider = self.provider;
        let tokens = response.filter_map(move |chunk| {
            future::ready(match chunk {
                Ok(StreamedAssistantContent::Text(text)) => Some(Ok(text.text)),
                // Tool calls, reasoning traces and the final usage record carry no text.
                Ok(_) => None,
                Err(e) => Some(Err(LlmError::Unavailable {
                    provider: provider.to_string(),
                    reason: e.to_string(),
                })),
            })
        });

        Ok(tokens.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_prompt_uses_last_user_message() {
        let messages = vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("second"),
        ];
        let (_, history) = split_prompt(&messages).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn split_prompt_rejects_empty_and_trailing_assistant() {
        assert!(split_prompt(&[]).is_none());
        assert!(split_prompt(&[ChatMessage::assistant("hello")]).is_none());
    }
}
