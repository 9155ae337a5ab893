// src/error.rs
//! Error taxonomy for one ingestion cycle.
//!
//! Every class except [`StoreError::Init`] is recovered inside the cycle:
//! source errors skip the source, scoring errors fall back to a neutral
//! verdict, notification errors are logged and dropped, and store errors
//! fail only the item being written.

use std::time::Duration;

/// Fetching or parsing one source target failed.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("http request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not parse feed {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("invalid source url {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid css selector `{0}`")]
    Selector(String),
}

/// The relevance scoring call could not produce a verdict.
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("no scoring credential configured")]
    Unconfigured,

    #[error("scoring request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("scoring service answered HTTP {0}")]
    Status(u16),

    #[error("scoring call timed out after {0:?}")]
    Timeout(Duration),

    #[error("scoring response had no usable score: {0:?}")]
    Unparseable(String),
}

/// Durable store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Cannot create/open the store. Fatal at startup.
    #[error("cannot open article store at {path}: {source}")]
    Init {
        path: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("article store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// One notification sink failed to deliver.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook post failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook answered HTTP {0}")]
    Status(u16),

    #[error("email delivery failed: {0}")]
    Email(String),
}
