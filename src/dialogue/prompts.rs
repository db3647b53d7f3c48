//! Prompts for flow detection, question rewording and request synthesis.
//!
//! Each builder returns the system prompt; the matching `*_user_message`
//! function builds the single user turn sent with it.

const DETECT_FLOW: &str =
    "You are an assistant that helps detect user intent for bureaucratic tasks.";

const REWORD_QUESTION: &str = "\
You are an assistant that rewords the next question in a conversational, \
friendly way while retaining its essential meaning.";

const REQUEST_GUIDELINES: &str = "\
You are an assistant that helps people with visa and residence permit renewals.

Write a polite, relevant request on the user's behalf:
- Use first-person language (\"I am... / I would like...\").
- Include the key details the user gave: name, nationality, location and the action they want to take.
- Leave out unrelated details such as accommodation, tourism or general city services.
- If some details are missing, politely mention them.
- End with a polite question such as \"What do I need to do next?\".

Examples:
- Input: \"I want to renew my visa. I live in Munich.\"
  Output: \"I am a resident of Munich, and I would like to renew my visa. Could you guide me through the process?\"
- Input: \"What should I do to renew my residence permit?\"
  Output: \"I would like to renew my residence permit. Could you tell me the steps I need to take?\"

Keep the request polite and concise. Reply with the request only.";

/// Classification: pick exactly one known flow id or `none`.
pub fn classification_system_prompt(flow_ids: &[&str]) -> String {
    let flow_list = flow_ids
        .iter()
        .map(|id| format!("- {id}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{DETECT_FLOW}

Here are the known flows:
{flow_list}

Guidelines:
- If the user's request clearly matches one of the known flows, return that flow name exactly.
- Otherwise, return 'none'.
- No extra commentary."
    )
}

pub fn classification_user_message(user_input: &str) -> String {
    format!("User request:\n{user_input}")
}

/// Rewording: recent conversation as context for the next scripted question.
pub fn reword_system_prompt(context: &str) -> String {
    format!(
        "{DETECT_FLOW}

{REWORD_QUESTION}

Conversation so far:
{context}

Please reply ONLY with the reworded question, nothing else."
    )
}

pub fn reword_user_message(raw_question: &str) -> String {
    format!("Raw next question:\n{raw_question}")
}

pub fn request_system_prompt() -> &'static str {
    REQUEST_GUIDELINES
}

pub fn request_user_message(transcript: &str) -> String {
    format!(
        "Below is the conversation so far, including both questions and user responses:\n{transcript}\n\n\
         Please generate a concise, polite user request to the relevant authority."
    )
}
