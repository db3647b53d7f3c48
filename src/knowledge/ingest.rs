//! Scraped-page ingestion.
//!
//! A crawler writes one JSON record per page. Each record is split into a
//! content item plus one item per PDF link, web link and phone number, then
//! embedded and stored.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::KnowledgeError;
use crate::knowledge::model::KnowledgeItem;
use crate::knowledge::store::KnowledgeStore;

/// One page as produced by the crawler.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapedPage {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub pdf_links: Vec<String>,
    #[serde(default)]
    pub all_links: Vec<String>,
    #[serde(default)]
    pub phone_numbers: Vec<ScrapedPhone>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrapedPhone {
    pub number: String,
    #[serde(default)]
    pub left_context: String,
    #[serde(default)]
    pub right_context: String,
}

impl ScrapedPage {
    /// Decode the page into knowledge items. Blank links and numbers are skipped.
    pub fn items(&self) -> Vec<KnowledgeItem> {
        let mut items = Vec::new();

        if !self.text.trim().is_empty() || !self.summary.trim().is_empty() {
            items.push(KnowledgeItem::Content {
                text: self.text.clone(),
                summary: self.summary.clone(),
                pdf_links: self.pdf_links.clone(),
                source_url: self.url.clone(),
            });
        }

        for url in self.pdf_links.iter().filter(|u| !u.trim().is_empty()) {
            items.push(KnowledgeItem::PdfLink {
                url: url.clone(),
                source_url: self.url.clone(),
            });
        }

        for url in self.all_links.iter().filter(|u| !u.trim().is_empty()) {
            items.push(KnowledgeItem::WebLink {
                url: url.clone(),
                source_url: self.url.clone(),
            });
        }

        for phone in &self.phone_numbers {
            let Some(number) = normalize_phone_number(&phone.number) else {
                warn!(raw = %phone.number, url = %self.url, "Skipping unparseable phone number");
                continue;
            };
            items.push(KnowledgeItem::PhoneNumber {
                number,
                left_context: phone.left_context.clone(),
                right_context: phone.right_context.clone(),
                source_url: self.url.clone(),
            });
        }

        items
    }
}

static PHONE_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\-()/.]").expect("valid phone noise regex"));

static PHONE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?\d{3,15}$").expect("valid phone shape regex"));

/// Normalize a phone number to `+digits` / `digits` form.
///
/// Separators are removed and a leading `00` becomes `+`. Returns `None`
/// when what remains is not 3 to 15 digits.
pub fn normalize_phone_number(raw: &str) -> Option<String> {
    let compact = PHONE_NOISE.replace_all(raw.trim(), "");
    let compact = match compact.strip_prefix("00") {
        Some(rest) if !compact.starts_with('+') => format!("+{rest}"),
        _ => compact.into_owned(),
    };
    PHONE_SHAPE.is_match(&compact).then_some(compact)
}

/// Ingest a single page. Returns the number of items stored.
pub async fn ingest_page(
    store: &dyn KnowledgeStore,
    page: &ScrapedPage,
) -> Result<usize, KnowledgeError> {
    let items = page.items();
    for item in &items {
        store.insert(item).await?;
    }
    info!(url = %page.url, items = items.len(), "Page ingested");
    Ok(items.len())
}

/// Ingest a JSON document holding one page object or an array of pages.
pub async fn ingest_json(store: &dyn KnowledgeStore, json: &str) -> Result<usize, KnowledgeError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| KnowledgeError::InvalidRecord(format!("not valid JSON: {e}")))?;

    let pages: Vec<ScrapedPage> = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value),
        _ => serde_json::from_value(value).map(|page| vec![page]),
    }
    .map_err(|e| KnowledgeError::InvalidRecord(format!("not a scraped page: {e}")))?;

    let mut total = 0;
    for page in &pages {
        total += ingest_page(store, page).await?;
    }
    Ok(total)
}

/// Read and ingest a crawler output file.
pub async fn ingest_file(store: &dyn KnowledgeStore, path: &Path) -> Result<usize, KnowledgeError> {
    let json = tokio::fs::read_to_string(path).await.map_err(|e| {
        KnowledgeError::InvalidRecord(format!("cannot read {}: {e}", path.display()))
    })?;
    ingest_json(store, &json).await
}
