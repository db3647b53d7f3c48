//! End-to-end dialogue tests against an in-memory database and stub models.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use uuid::Uuid;

use intake_assist::config::AssistantConfig;
use intake_assist::dialogue::{ConversationPhase, MessageRole, UNSUPPORTED_PROCESS};
use intake_assist::error::{AssistantError, LlmError};
use intake_assist::flows::FlowRegistry;
use intake_assist::knowledge::{HashEmbedder, LibSqlKnowledgeStore};
use intake_assist::llm::{CompletionRequest, LlmProvider, ModelGateway, TokenStream};
use intake_assist::store::{Database, LibSqlBackend};
use intake_assist::{Assistant, AssistantDeps};

const REQUEST_TEXT: &str =
    "I am Ana Souza from Brazil and I would like to extend my residence permit. What do I need to do next?";

/// Answers by looking at which prompt it was given.
struct PromptAwareLlm {
    calls: AtomicUsize,
}

impl PromptAwareLlm {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn answer(request: &CompletionRequest) -> String {
        let system = request.system_prompt.as_deref().unwrap_or_default();
        let user = request
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        if system.contains("known flows") {
            if user.to_lowercase().contains("visa") {
                "visa_extension".to_string()
            } else {
                "none".to_string()
            }
        } else if let Some(raw) = user.strip_prefix("Raw next question:\n") {
            format!("Quick question: {raw}")
        } else {
            REQUEST_TEXT.to_string()
        }
    }
}

#[async_trait]
impl LlmProvider for PromptAwareLlm {
    fn provider_name(&self) -> &str {
        "stub"
    }
    fn model_name(&self) -> &str {
        "stub-model"
    }
    async fn stream(&self, request: CompletionRequest) -> Result<TokenStream, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = Self::answer(&request);
        Ok(Box::pin(stream::iter(vec![Ok(text)])))
    }
}

/// Never produces a token.
struct HangingLlm;

#[async_trait]
impl LlmProvider for HangingLlm {
    fn provider_name(&self) -> &str {
        "hanging"
    }
    fn model_name(&self) -> &str {
        "hanging-model"
    }
    async fn stream(&self, _request: CompletionRequest) -> Result<TokenStream, LlmError> {
        Ok(Box::pin(stream::pending()))
    }
}

async fn assistant(provider: Arc<dyn LlmProvider>) -> (Assistant, Arc<dyn Database>) {
    let backend = LibSqlBackend::new_memory().await.unwrap();
    let knowledge = Arc::new(LibSqlKnowledgeStore::new(
        backend.connection(),
        Arc::new(HashEmbedder::new()),
    ));
    let db: Arc<dyn Database> = Arc::new(backend);
    let gateway = ModelGateway::new(provider).with_default_timeout(Duration::from_millis(100));

    let assistant = Assistant::new(AssistantDeps {
        db: db.clone(),
        knowledge,
        gateway: Arc::new(gateway),
        flows: Arc::new(FlowRegistry::builtin()),
        config: AssistantConfig::default(),
    });
    (assistant, db)
}

const ANSWERS: [&str; 12] = [
    "Residence permit",
    "Brazilian",
    "Ana Souza",
    "02/03/1990",
    "Leopoldstr. 1, 80802",
    "Continued employment",
    "12",
    "01/09/2026",
    "Yes",
    "Yes",
    "Employed at Example GmbH",
    "KVR Ruppertstraße",
];

#[tokio::test]
async fn visa_extension_runs_to_completion() {
    let (assistant, db) = assistant(Arc::new(PromptAwareLlm::new())).await;
    let questions = FlowRegistry::builtin()
        .questions("visa_extension")
        .unwrap()
        .to_vec();

    let opening = assistant
        .handle_message(None, "I want to extend my visa")
        .await
        .unwrap();
    let id = opening.conversation_id.unwrap();
    assert_eq!(opening.response, format!("Quick question: {}", questions[0]));
    assert!(!opening.finished);

    let mut finished_count = 0;
    for (i, answer) in ANSWERS.iter().enumerate() {
        let before = db.get_conversation(id).await.unwrap().unwrap().state_index;
        let outcome = assistant.handle_message(Some(id), answer).await.unwrap();
        let after = db.get_conversation(id).await.unwrap().unwrap().state_index;
        assert!(after == before || after == before + 1);

        if i + 1 < ANSWERS.len() {
            assert_eq!(outcome.response, format!("Quick question: {}", questions[i + 1]));
            assert!(!outcome.finished);
        } else {
            assert_eq!(outcome.response, REQUEST_TEXT);
        }
        if outcome.finished {
            finished_count += 1;
        }
    }
    assert_eq!(finished_count, 1);

    let conversation = db.get_conversation(id).await.unwrap().unwrap();
    assert_eq!(conversation.state_index, 11);
    assert_eq!(conversation.phase, ConversationPhase::Finished);

    let err = assistant
        .handle_message(Some(id), "one more thing")
        .await
        .unwrap_err();
    assert!(matches!(err, AssistantError::ConversationFinished { .. }));
    assert_eq!(db.get_conversation(id).await.unwrap().unwrap().state_index, 11);

    let log = assistant.transcript(id).await.unwrap();
    assert_eq!(log.len(), 26);
    assert_eq!(log[0].content, "I want to extend my visa");
    assert_eq!(log.last().unwrap().role, MessageRole::Assistant);
    assert!(log.windows(2).all(|w| w[0].seq < w[1].seq));
}

#[tokio::test]
async fn residence_permit_answer_gets_nationality_question() {
    let (assistant, _) = assistant(Arc::new(PromptAwareLlm::new())).await;
    let id = assistant
        .handle_message(None, "visa extension please")
        .await
        .unwrap()
        .conversation_id
        .unwrap();

    let outcome = assistant
        .handle_message(Some(id), "Residence permit")
        .await
        .unwrap();
    assert!(outcome.response.contains("What is your nationality?"));
}

#[tokio::test]
async fn unsupported_request_starts_nothing() {
    let (assistant, _) = assistant(Arc::new(PromptAwareLlm::new())).await;
    let outcome = assistant
        .handle_message(None, "I lost my bike")
        .await
        .unwrap();
    assert_eq!(outcome.conversation_id, None);
    assert_eq!(outcome.response, UNSUPPORTED_PROCESS);
    assert!(outcome.finished);
}

#[tokio::test]
async fn unknown_conversation_id_surfaces() {
    let (assistant, _) = assistant(Arc::new(PromptAwareLlm::new())).await;
    let err = assistant
        .handle_message(Some(Uuid::new_v4()), "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, AssistantError::ConversationNotFound { .. }));
}

#[tokio::test]
async fn hanging_model_still_completes_the_flow() {
    let (assistant, db) = assistant(Arc::new(HangingLlm)).await;
    let questions = FlowRegistry::builtin()
        .questions("visa_extension")
        .unwrap()
        .to_vec();

    // Keyword fallback picks the flow; the raw question is asked.
    let opening = assistant
        .handle_message(None, "Need to extend my residence permit")
        .await
        .unwrap();
    let id = opening.conversation_id.unwrap();
    assert_eq!(opening.response, questions[0]);

    let mut last = None;
    for (i, answer) in ANSWERS.iter().enumerate() {
        let outcome = assistant.handle_message(Some(id), answer).await.unwrap();
        if i + 1 < ANSWERS.len() {
            assert_eq!(outcome.response, questions[i + 1]);
        }
        last = Some(outcome);
    }

    let last = last.unwrap();
    assert!(last.finished);
    let bullets: Vec<&str> = last.response.lines().skip(1).collect();
    assert_eq!(bullets.len(), 13);
    assert_eq!(bullets[0], "- Need to extend my residence permit");
    assert_eq!(bullets[12], "- KVR Ruppertstraße");
    assert_eq!(
        db.get_conversation(id).await.unwrap().unwrap().phase,
        ConversationPhase::Finished
    );
}

#[tokio::test]
async fn hanging_model_gives_typed_errors_for_retrieval() {
    let (assistant, _) = assistant(Arc::new(HangingLlm)).await;
    // Empty knowledge store: checklist has no data, phone lookup never calls the model.
    assert!(matches!(
        assistant.generate_checklist("residence permit").await,
        Err(AssistantError::NoDataFound { .. })
    ));
    assert_eq!(
        assistant.resolve_phone("residence permit").await.unwrap(),
        "NoPhoneAvailable"
    );
}

#[tokio::test]
async fn concurrent_conversations_are_independent() {
    let llm = Arc::new(PromptAwareLlm::new());
    let (assistant, db) = assistant(llm.clone()).await;
    let assistant = Arc::new(assistant);

    let mut handles = Vec::new();
    for n in 0..4 {
        let assistant = assistant.clone();
        handles.push(tokio::spawn(async move {
            let id = assistant
                .handle_message(None, &format!("visa renewal #{n}"))
                .await
                .unwrap()
                .conversation_id
                .unwrap();
            for answer in &ANSWERS[..3] {
                assistant.handle_message(Some(id), answer).await.unwrap();
            }
            id
        }));
    }

    for handle in handles {
        let id = handle.await.unwrap();
        let conversation = db.get_conversation(id).await.unwrap().unwrap();
        assert_eq!(conversation.state_index, 3);
        assert_eq!(db.list_messages(id).await.unwrap().len(), 8);
    }
    assert!(llm.calls.load(Ordering::SeqCst) >= 16);
}

#[tokio::test]
async fn concurrent_answers_to_one_conversation_never_skip() {
    let (assistant, db) = assistant(Arc::new(PromptAwareLlm::new())).await;
    let assistant = Arc::new(assistant);
    let id = assistant
        .handle_message(None, "visa please")
        .await
        .unwrap()
        .conversation_id
        .unwrap();

    let mut handles = Vec::new();
    for answer in &ANSWERS[..5] {
        let assistant = assistant.clone();
        let answer = answer.to_string();
        handles.push(tokio::spawn(async move {
            assistant.handle_message(Some(id), &answer).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(db.get_conversation(id).await.unwrap().unwrap().state_index, 5);
    let log = db.list_messages(id).await.unwrap();
    assert_eq!(log.len(), 12);
    // Every user answer is followed directly by its question.
    for pair in log.chunks(2) {
        assert_eq!(pair[0].role, MessageRole::User);
        assert_eq!(pair[1].role, MessageRole::Assistant);
    }
}
