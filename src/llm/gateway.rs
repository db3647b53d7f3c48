//! Model gateway: one awaited call that hides token streaming.
//!
//! Callers hand over a `CompletionRequest` and get back the fully accumulated
//! text. The whole call (stream setup plus every token) is bounded by a
//! timeout; on expiry the stream future is dropped, which cancels the
//! underlying HTTP request. The gateway never retries.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_stream::StreamExt;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, LlmProvider};

/// Default cap on a single model call.
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(30);

/// Uniform entry point to the configured conversational model.
pub struct ModelGateway {
    provider: Arc<dyn LlmProvider>,
    default_timeout: Duration,
}

impl ModelGateway {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            default_timeout: DEFAULT_MODEL_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Run a completion and return the concatenated token text.
    pub async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let started = Instant::now();

        let result = tokio::time::timeout(timeout, self.accumulate(request)).await;

        match result {
            Ok(Ok(text)) => {
                debug!(
                    provider = self.provider.provider_name(),
                    chars = text.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Model call complete"
                );
                Ok(text)
            }
            Ok(Err(e)) => {
                warn!(provider = self.provider.provider_name(), error = %e, "Model call failed");
                Err(e)
            }
            Err(_) => {
                warn!(
                    provider = self.provider.provider_name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Model call timed out"
                );
                Err(LlmError::Timeout {
                    provider: self.provider.provider_name().to_string(),
                    timeout,
                })
            }
        }
    }

    async fn accumulate(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let mut stream = self.provider.stream(request).await?;
        let mut text = String::new();
        while let Some(token) = stream.next().await {
            text.push_str(&token?);
        }
        Ok(text)
    }
}
