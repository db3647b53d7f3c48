//! Persistence layer: libSQL-backed storage for conversations and knowledge.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::{LibSqlBackend, SharedConnection};
pub use traits::Database;
