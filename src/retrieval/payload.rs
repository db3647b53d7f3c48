//! Strict-format extraction of JSON objects from model output.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::AssistantError;

/// How many times a failed parse is repaired before giving up.
pub const MAX_REPAIR_ATTEMPTS: usize = 1;

/// Parse model output into a JSON object.
///
/// Leading and trailing code fences are stripped first. If that does not
/// parse, one repair locates a fenced block or the outermost `{...}`.
/// Anything that still fails, or parses to a non-object, is malformed.
pub fn extract_structured_payload(raw: &str) -> Result<Map<String, Value>, AssistantError> {
    let mut candidate = strip_fences(raw);
    let mut attempts = 0;

    loop {
        match serde_json::from_str::<Value>(&candidate) {
            Ok(Value::Object(map)) => return Ok(map),
            Ok(other) => {
                return Err(AssistantError::MalformedModelOutput {
                    reason: format!("expected a JSON object, got {}", json_kind(&other)),
                });
            }
            Err(e) if attempts >= MAX_REPAIR_ATTEMPTS => {
                return Err(AssistantError::MalformedModelOutput {
                    reason: format!("not valid JSON after repair: {e}"),
                });
            }
            Err(e) => {
                debug!(error = %e, "Model output is not JSON, attempting repair");
                attempts += 1;
                candidate = repair(raw);
            }
        }
    }
}

/// Remove a leading ```/```json line and a trailing ``` if present.
fn strip_fences(text: &str) -> String {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches("json"),
        };
    }
    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }
    s.trim().to_string()
}

/// Extract a JSON object from surrounding prose or markdown.
fn repair(text: &str) -> String {
    let trimmed = text.trim();

    let mut region = trimmed;
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            region = &after[..end];
        }
    } else if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```")
            && after[..end].contains('{')
        {
            region = &after[..end];
        }
    }

    if let (Some(start), Some(end)) = (region.find('{'), region.rfind('}'))
        && end > start
    {
        return region[start..=end].trim().to_string();
    }

    region.trim().to_string()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
