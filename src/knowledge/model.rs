//! Knowledge item records as they are stored and retrieved.

use serde::{Deserialize, Serialize};

/// One ingested, embedded record.
///
/// The variant tag is the `type` field of the stored payload, so a record is
/// decoded exactly once when it leaves the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KnowledgeItem {
    /// Body text of a scraped page.
    Content {
        text: String,
        #[serde(default)]
        summary: String,
        #[serde(default)]
        pdf_links: Vec<String>,
        #[serde(default)]
        source_url: String,
    },
    PdfLink {
        url: String,
        #[serde(default)]
        source_url: String,
    },
    WebLink {
        url: String,
        #[serde(default)]
        source_url: String,
    },
    /// A phone number found on a page, with the text around it.
    PhoneNumber {
        number: String,
        #[serde(default)]
        left_context: String,
        #[serde(default)]
        right_context: String,
        #[serde(default)]
        source_url: String,
    },
}

impl KnowledgeItem {
    pub fn kind(&self) -> KnowledgeKind {
        match self {
            Self::Content { .. } => KnowledgeKind::Content,
            Self::PdfLink { .. } => KnowledgeKind::PdfLink,
            Self::WebLink { .. } => KnowledgeKind::WebLink,
            Self::PhoneNumber { .. } => KnowledgeKind::PhoneNumber,
        }
    }

    pub fn source_url(&self) -> &str {
        match self {
            Self::Content { source_url, .. }
            | Self::PdfLink { source_url, .. }
            | Self::WebLink { source_url, .. }
            | Self::PhoneNumber { source_url, .. } => source_url,
        }
    }

    /// Text fed to the embedder at ingestion time.
    pub fn embedding_text(&self) -> String {
        match self {
            Self::Content { text, summary, .. } => format!("{text} {summary}"),
            Self::PdfLink { url, .. } | Self::WebLink { url, .. } => url.clone(),
            Self::PhoneNumber {
                number,
                left_context,
                right_context,
                ..
            } => format!("{left_context} {number} {right_context}"),
        }
    }
}

/// Discriminant of [`KnowledgeItem`], used for filtered searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeKind {
    Content,
    PdfLink,
    WebLink,
    PhoneNumber,
}

impl KnowledgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::PdfLink => "pdf_link",
            Self::WebLink => "web_link",
            Self::PhoneNumber => "phone_number",
        }
    }
}

impl std::fmt::Display for KnowledgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A search hit with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredItem {
    pub item: KnowledgeItem,
    pub score: f64,
}
