//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{DEFAULT_MODEL_TIMEOUT, LlmBackend, LlmConfig};

/// Token budget and sampling temperature for one kind of model call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CallParams {
    pub const fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
        }
    }
}

/// Per-call model parameters and retrieval sizes.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub classify: CallParams,
    pub reword: CallParams,
    pub request: CallParams,
    pub checklist: CallParams,
    pub phone: CallParams,
    /// Messages of context given to the question rewriter.
    pub reword_context_messages: usize,
    /// Content items retrieved per checklist.
    pub checklist_top_k: usize,
    /// Phone candidates retrieved per lookup.
    pub phone_top_k: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            classify: CallParams::new(30, 0.0),
            reword: CallParams::new(120, 0.3),
            request: CallParams::new(400, 0.4),
            checklist: CallParams::new(600, 0.4),
            phone: CallParams::new(60, 0.0),
            reword_context_messages: 5,
            checklist_top_k: 10,
            phone_top_k: 5,
        }
    }
}

/// Which embedder backs the knowledge store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderBackend {
    /// Offline hashed bag-of-words.
    Hash,
    /// OpenAI embedding model via rig-core.
    OpenAi,
}

impl FromStr for EmbedderBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hash" => Ok(Self::Hash),
            "openai" | "open_ai" => Ok(Self::OpenAi),
            other => Err(ConfigError::InvalidValue {
                key: "INTAKE_ASSIST_EMBEDDER".to_string(),
                message: format!("unknown embedder '{other}' (expected hash or openai)"),
            }),
        }
    }
}

/// Process configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub model_timeout: Duration,
    pub db_path: PathBuf,
    pub embedder: EmbedderBackend,
    pub embedding_model: String,
    /// Only needed when `embedder` is OpenAi.
    pub openai_api_key: Option<SecretString>,
    /// JSON flow definitions; the built-in flows are used when unset.
    pub flows_path: Option<PathBuf>,
    /// Directory for daily rolling log files.
    pub log_dir: Option<PathBuf>,
    pub assistant: AssistantConfig,
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend: LlmBackend = get("INTAKE_ASSIST_LLM_BACKEND")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(LlmBackend::Anthropic);

        let api_key = get(backend.api_key_var())
            .ok_or_else(|| ConfigError::MissingEnvVar(backend.api_key_var().to_string()))?;

        let model = get("INTAKE_ASSIST_MODEL").unwrap_or_else(|| backend.default_model().to_string());

        let model_timeout = match get("INTAKE_ASSIST_MODEL_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "INTAKE_ASSIST_MODEL_TIMEOUT_SECS".to_string(),
                    message: format!("'{raw}' is not a whole number of seconds"),
                })?;
                if secs == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "INTAKE_ASSIST_MODEL_TIMEOUT_SECS".to_string(),
                        message: "timeout must be positive".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_MODEL_TIMEOUT,
        };

        let embedder: EmbedderBackend = get("INTAKE_ASSIST_EMBEDDER")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(EmbedderBackend::Hash);

        let openai_api_key = get("OPENAI_API_KEY").map(SecretString::from);
        if embedder == EmbedderBackend::OpenAi && openai_api_key.is_none() {
            return Err(ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()));
        }

        Ok(Self {
            llm: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model,
            },
            model_timeout,
            db_path: get("INTAKE_ASSIST_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/intake-assist.db")),
            embedder,
            embedding_model: get("INTAKE_ASSIST_EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            openai_api_key,
            flows_path: get("INTAKE_ASSIST_FLOWS_PATH").map(PathBuf::from),
            log_dir: get("INTAKE_ASSIST_LOG_DIR").map(PathBuf::from),
            assistant: AssistantConfig::default(),
        })
    }
}
