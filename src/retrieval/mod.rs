//! Retrieval-augmented synthesis: checklists and contact numbers.

pub mod checklist;
pub mod contact;
pub mod payload;
pub mod prompts;

pub use checklist::{Checklist, ChecklistGenerator, ChecklistStep};
pub use contact::ContactResolver;
pub use payload::extract_structured_payload;
pub use prompts::NO_PHONE_SENTINEL;
