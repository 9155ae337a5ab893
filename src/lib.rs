// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod scoring;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::ingest::types::{CandidateItem, SourceProvider};
pub use crate::notify::NotifierMux;
pub use crate::pipeline::{CycleReport, Pipeline};
pub use crate::store::{ArticleRepository, SqliteArticleStore, StoredArticle};
