//! CLI: stdin/stdout REPL for local use.
//!
//! Plain lines go to the active conversation. Slash commands reach the
//! retrieval side and the knowledge ingestion boundary.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::assistant::Assistant;
use crate::knowledge::{KnowledgeStore, ingest_file};

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Message(String),
    Checklist(String),
    Phone(String),
    Request,
    Ingest(PathBuf),
    New,
    Quit,
    Help,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if !line.starts_with('/') {
            return Some(Self::Message(line.to_string()));
        }

        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        Some(match name {
            "/checklist" => Self::Checklist(rest.to_string()),
            "/phone" => Self::Phone(rest.to_string()),
            "/request" => Self::Request,
            "/ingest" if !rest.is_empty() => Self::Ingest(PathBuf::from(rest)),
            "/new" => Self::New,
            "/quit" | "/exit" => Self::Quit,
            "/help" => Self::Help,
            other => Self::Unknown(other.to_string()),
        })
    }
}

const HELP: &str = "\
Commands:
  <text>               answer the current question (or start a new request)
  /checklist <query>   build a checklist from the knowledge base
  /phone <query>       find a contact phone number
  /request             draft a request from the current conversation
  /ingest <file.json>  ingest a scraped page (or an array of pages)
  /new                 forget the current conversation
  /quit                exit";

/// REPL state: the conversation the user is currently answering.
pub struct Repl {
    assistant: Arc<Assistant>,
    knowledge: Arc<dyn KnowledgeStore>,
    conversation: Option<Uuid>,
}

impl Repl {
    pub fn new(assistant: Arc<Assistant>, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            assistant,
            knowledge,
            conversation: None,
        }
    }

    /// Read stdin until EOF or `/quit`.
    pub async fn run(mut self) -> std::io::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        eprint!("> ");

        while let Some(line) = lines.next_line().await? {
            let Some(command) = Command::parse(&line) else {
                eprint!("> ");
                continue;
            };
            if command == Command::Quit {
                break;
            }
            let output = self.execute(command).await;
            println!("\n{output}\n");
            eprint!("> ");
        }
        Ok(())
    }

    /// Execute one command and return the text to show.
    pub async fn execute(&mut self, command: Command) -> String {
        match command {
            Command::Message(text) => {
                match self.assistant.handle_message(self.conversation, &text).await {
                    Ok(outcome) => {
                        self.conversation = if outcome.finished {
                            None
                        } else {
                            outcome.conversation_id
                        };
                        outcome.response
                    }
                    Err(e) => format!("Error: {e}"),
                }
            }
            Command::Checklist(query) => match self.assistant.generate_checklist(&query).await {
                Ok(checklist) => {
                    let mut out = checklist.instructions.join("\n");
                    for link in &checklist.pdf_links {
                        out.push_str(&format!("\nPDF: {link}"));
                    }
                    if let Some(source) = &checklist.source {
                        out.push_str(&format!("\nSource: {source}"));
                    }
                    out.push_str(&format!("\n\n{}", checklist.closing));
                    out
                }
                Err(e) => format!("Error: {e}"),
            },
            Command::Phone(query) => match self.assistant.resolve_phone(&query).await {
                Ok(phone) => phone,
                Err(e) => format!("Error: {e}"),
            },
            Command::Request => match self.conversation {
                Some(id) => match self.assistant.generate_request(id).await {
                    Ok(request) => request,
                    Err(e) => format!("Error: {e}"),
                },
                None => "No active conversation.".to_string(),
            },
            Command::Ingest(path) => match ingest_file(self.knowledge.as_ref(), &path).await {
                Ok(count) => format!("Ingested {count} items from {}", path.display()),
                Err(e) => format!("Error: {e}"),
            },
            Command::New => {
                self.conversation = None;
                "Started over.".to_string()
            }
            Command::Help => HELP.to_string(),
            Command::Unknown(name) => format!("Unknown command {name}. Type /help."),
            Command::Quit => String::new(),
        }
    }
}
