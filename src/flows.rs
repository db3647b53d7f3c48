//! Flow registry: the scripted intake questionnaires.
//!
//! Each flow is an ordered list of questions plus the keywords used by the
//! classifier's offline fallback. The registry is built once and read-only
//! afterwards.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One scripted questionnaire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub id: String,
    pub questions: Vec<String>,
    /// Lowercase substrings that select this flow when the model is unavailable.
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FlowRegistry {
    flows: Vec<FlowDefinition>,
}

impl FlowRegistry {
    /// Build a registry, rejecting flows without questions, duplicate ids and
    /// ids the classifier could never match (it compares lowercase answers).
    pub fn new(flows: Vec<FlowDefinition>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for flow in &flows {
            if flow.id.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "flows".to_string(),
                    message: "flow id must not be empty".to_string(),
                });
            }
            if flow.id != flow.id.trim().to_lowercase() {
                return Err(ConfigError::InvalidValue {
                    key: format!("flows.{}", flow.id),
                    message: "flow id must be lowercase without surrounding whitespace"
                        .to_string(),
                });
            }
            if flow.questions.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: format!("flows.{}", flow.id),
                    message: "flow has no questions".to_string(),
                });
            }
            if !seen.insert(flow.id.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: format!("flows.{}", flow.id),
                    message: "duplicate flow id".to_string(),
                });
            }
        }

        let flows = flows
            .into_iter()
            .map(|mut flow| {
                flow.keywords = flow
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                flow
            })
            .collect();
        Ok(Self { flows })
    }

    /// The flows shipped with the binary.
    pub fn builtin() -> Self {
        Self {
            flows: vec![visa_extension()],
        }
    }

    /// Parse a JSON array of flow definitions.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let flows: Vec<FlowDefinition> = serde_json::from_str(json)
            .map_err(|e| ConfigError::ParseError(format!("flows JSON: {e}")))?;
        Self::new(flows)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Ids the classifier may return, in registration order.
    pub fn known_flow_ids(&self) -> Vec<&str> {
        self.flows.iter().map(|f| f.id.as_str()).collect()
    }

    pub fn get(&self, flow_id: &str) -> Option<&FlowDefinition> {
        self.flows.iter().find(|f| f.id == flow_id)
    }

    pub fn questions(&self, flow_id: &str) -> Option<&[String]> {
        self.get(flow_id).map(|f| f.questions.as_slice())
    }

    pub fn contains(&self, flow_id: &str) -> bool {
        self.get(flow_id).is_some()
    }

    /// First flow with a keyword contained in `text` (case-insensitive).
    pub fn match_keywords(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.flows
            .iter()
            .find(|flow| flow.keywords.iter().any(|k| lowered.contains(k.as_str())))
            .map(|flow| flow.id.as_str())
    }
}

fn visa_extension() -> FlowDefinition {
    let questions = [
        "What is your current visa or residence permit type?",
        "What is your nationality?",
        "What is your full name (as on your passport)?",
        "What is your date of birth? (DD/MM/YYYY)",
        "What is your current address in Munich? (street, house number, postal code)",
        "What is the reason for your visa extension? (e.g., continued studies, employment, family reasons, etc.)",
        "How many months would you like to extend?",
        "What is your desired extension start date? (e.g., after your current visa expires)",
        "Do you have proof of financial resources for the extended period? (Yes/No)",
        "Do you have valid health insurance covering the extended stay? (Yes/No)",
        "Are you currently employed or studying? Please specify employer/university.",
        "Which local Foreigners Office (KVR / Ausländerbehörde) do you usually go to?",
    ];

    FlowDefinition {
        id: "visa_extension".to_string(),
        questions: questions.iter().map(|q| q.to_string()).collect(),
        keywords: ["visa", "extend", "extension", "residence permit"]
            .iter()
            .map(|k| k.to_string())
            .collect(),
    }
}
