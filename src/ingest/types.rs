// src/ingest/types.rs
use chrono::{DateTime, Utc};

use crate::error::SourceError;

/// One fetched entry, not yet accepted into storage.
///
/// Every adapter (feeds, bulletin board, synthetic test entries) builds this
/// same shape; optional fields stay `None` when the source lacks them.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct CandidateItem {
    pub title: String,
    /// Raw body text, possibly HTML.
    pub body: String,
    /// Canonical link; the dedup key.
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Publish date exactly as the source wrote it.
    pub published_raw: Option<String>,
    pub source_label: String,
}

impl CandidateItem {
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            body: String::new(),
            link: link.into(),
            published_at: None,
            published_raw: None,
            source_label: source_label.into(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the raw publish string and its parsed form (if it parses).
    pub fn with_published(mut self, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        self.published_at = crate::ingest::parse_published(&raw);
        self.published_raw = Some(raw);
        self
    }
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<CandidateItem>, SourceError>;
    fn name(&self) -> &str;
}
