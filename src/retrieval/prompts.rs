//! Prompts for checklist formatting and contact selection.

use crate::retrieval::checklist::ChecklistStep;

/// Literal the model returns when no candidate phone number fits.
pub const NO_PHONE_SENTINEL: &str = "NoPhoneAvailable";

pub fn checklist_system_prompt() -> &'static str {
    "\
You are an assistant that writes structured checklists for bureaucratic procedures \
in Munich, based on information from the official city portal.

Return the response strictly as JSON with this structure:
{
  \"steps\": [\"Step 1: Description of the first step.\", \"Step 2: ...\"],
  \"pdf_links\": [\"...only PDF links that appear in the provided steps...\"],
  \"source\": \"...only a source URL that appears in the provided steps...\",
  \"closing\": \"Short concluding sentence summarizing the process or next steps.\"
}

Do not include explanations, comments or any text outside the JSON object."
}

/// Render retrieved steps and the user's request.
pub fn checklist_user_message(query: &str, steps: &[ChecklistStep]) -> String {
    let mut formatted = String::new();
    for (idx, step) in steps.iter().enumerate() {
        formatted.push_str(&format!("Step {}:\n{}\n", idx + 1, step.text));
        for detail in &step.details {
            formatted.push_str(&format!("- {detail}\n"));
        }
        if !step.pdf_links.is_empty() {
            formatted.push_str(&format!("PDF Links:\n{}\n", step.pdf_links.join("\n")));
        }
        formatted.push_str(&format!("Source: {}\n\n", step.source));
    }

    format!("Relevant steps:\n{formatted}User request: {query}")
}

pub fn phone_system_prompt() -> String {
    format!(
        "You pick the single best phone number for the user's request from a list of \
candidates found on official pages. Reply with the phone number exactly as listed and \
nothing else. If none of the candidates fits the request, reply with {NO_PHONE_SENTINEL}."
    )
}

/// One line per candidate: number, surrounding text, source page.
pub fn phone_user_message(query: &str, candidates: &[(String, String, String)]) -> String {
    let listed = candidates
        .iter()
        .enumerate()
        .map(|(i, (number, context, source))| {
            format!("{}. {number} | context: {context} | source: {source}", i + 1)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("Candidates:\n{listed}\n\nUser request: {query}")
}
