//! Stub providers shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, LlmProvider, TokenStream};

/// What a scripted call does.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail,
    Stall,
}

/// Provider that replays a script and records every request.
///
/// Once the script is exhausted the last reply repeats.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Reply>>,
    last: Mutex<Reply>,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(script: Vec<Reply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Reply::Fail),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(text: &str) -> Self {
        Self::new(vec![Reply::Text(text.to_string())])
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Reply::Text(t.to_string())).collect())
    }

    pub fn failing() -> Self {
        Self::new(vec![Reply::Fail])
    }

    pub fn stalling() -> Self {
        Self::new(vec![Reply::Stall])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Reply {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = script.pop_front() {
            *last = reply;
        }
        last.clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }

    async fn stream(&self, request: CompletionRequest) -> Result<TokenStream, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        match self.next_reply() {
            Reply::Text(text) => {
                // Split into a few tokens so accumulation is exercised.
                let tokens: Vec<Result<String, LlmError>> = text
                    .split_inclusive(' ')
                    .map(|t| Ok(t.to_string()))
                    .collect();
                Ok(Box::pin(stream::iter(tokens)))
            }
            Reply::Fail => Err(LlmError::Unavailable {
                provider: "scripted".to_string(),
                reason: "scripted failure".to_string(),
            }),
            Reply::Stall => Ok(Box::pin(stream::pending())),
        }
    }
}
