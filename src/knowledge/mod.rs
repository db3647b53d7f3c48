//! Knowledge store: embedded snippets scraped from the city portal.

pub mod embedding;
pub mod ingest;
pub mod model;
pub mod store;

pub use embedding::{Embedder, HashEmbedder, RigEmbedder, create_openai_embedder};
pub use ingest::{ScrapedPage, ScrapedPhone, ingest_file, ingest_json, ingest_page};
pub use model::{KnowledgeItem, KnowledgeKind, ScoredItem};
pub use store::{KnowledgeStore, LibSqlKnowledgeStore};
