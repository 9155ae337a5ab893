// src/notify/mod.rs
//! Score-gated alerts for stored articles.
//!
//! Delivery is fire-and-forget: each sink is tried once, failures are logged
//! and counted, never returned to the pipeline.

pub mod discord;
pub mod email;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;
use crate::store::StoredArticle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Important,
    Breaking,
}

impl Severity {
    pub fn tag(self) -> &'static str {
        match self {
            Severity::Important => "important",
            Severity::Breaking => "breaking",
        }
    }

    fn headline(self) -> &'static str {
        match self {
            Severity::Important => "VIKTIG",
            Severity::Breaking => "BREAKING",
        }
    }
}

/// Threshold gate: below `threshold` nothing is sent; at or above
/// `breaking_threshold` the alert is tagged breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertGate {
    pub threshold: u8,
    pub breaking_threshold: u8,
}

impl Default for AlertGate {
    fn default() -> Self {
        Self {
            threshold: 70,
            breaking_threshold: 90,
        }
    }
}

impl AlertGate {
    pub fn classify(&self, score: i64) -> Option<Severity> {
        if score < i64::from(self.threshold) {
            None
        } else if score >= i64::from(self.breaking_threshold) {
            Some(Severity::Breaking)
        } else {
            Some(Severity::Important)
        }
    }
}

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleAlert {
    pub severity: Severity,
    pub score: i64,
    pub title: String,
    pub link: String,
    pub justification: String,
    pub source: String,
}

impl ArticleAlert {
    pub fn from_article(article: &StoredArticle, severity: Severity) -> Self {
        Self {
            severity,
            score: article.ai_score,
            title: article.title.clone(),
            link: article.link.clone(),
            justification: article.ai_reason.clone(),
            source: article.source.clone(),
        }
    }

    /// Plain-text rendering shared by the text sinks.
    pub fn text(&self) -> String {
        format!(
            "[{}] {} ({}/100)\n{}\n{}\nKilde: {}",
            self.severity.headline(),
            self.title,
            self.score,
            self.link,
            self.justification,
            self.source
        )
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &ArticleAlert) -> Result<(), NotifyError>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub threshold: u8,
    pub breaking_threshold: u8,
    /// Generic text webhook (`{"text": ...}`), e.g. Slack/Teams/Mattermost.
    pub webhook_url: Option<String>,
    pub discord_webhook_url: Option<String>,
    /// Send email too; SMTP settings come from `SMTP_*` env vars.
    pub email: bool,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        let gate = AlertGate::default();
        Self {
            threshold: gate.threshold,
            breaking_threshold: gate.breaking_threshold,
            webhook_url: None,
            discord_webhook_url: None,
            email: false,
            timeout_secs: 5,
        }
    }
}

impl NotifyConfig {
    pub fn gate(&self) -> AlertGate {
        AlertGate {
            threshold: self.threshold.min(100),
            breaking_threshold: self.breaking_threshold.min(100),
        }
    }
}

/// What happened to one article's alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    BelowThreshold,
    Dispatched {
        severity: Severity,
        delivered: usize,
        failed: usize,
    },
}

/// Fans one alert out to every configured sink.
#[derive(Clone)]
pub struct NotifierMux {
    gate: AlertGate,
    sinks: Vec<Arc<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(gate: AlertGate) -> Self {
        Self {
            gate,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn from_config(cfg: &NotifyConfig) -> Self {
        let timeout = Duration::from_secs(cfg.timeout_secs.max(1));
        let mut mux = Self::new(cfg.gate());
        if let Some(url) = &cfg.webhook_url {
            mux = mux.with_sink(Arc::new(webhook::WebhookNotifier::new(url.clone()).with_timeout(timeout)));
        }
        if let Some(url) = &cfg.discord_webhook_url {
            mux = mux.with_sink(Arc::new(discord::DiscordNotifier::new(url.clone()).with_timeout(timeout)));
        }
        if cfg.email {
            match email::EmailSender::from_env() {
                Ok(sender) => mux = mux.with_sink(Arc::new(sender)),
                Err(e) => tracing::warn!(target: "notify", error = %e, "email channel disabled"),
            }
        }
        if mux.sinks.is_empty() {
            tracing::info!(target: "notify", "no notification sinks configured; alerts are logged only");
        }
        mux
    }

    pub fn gate(&self) -> AlertGate {
        self.gate
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Gate, then deliver to all sinks. Never fails.
    pub async fn notify(&self, article: &StoredArticle) -> NotifyOutcome {
        let Some(severity) = self.gate.classify(article.ai_score) else {
            return NotifyOutcome::BelowThreshold;
        };
        let alert = ArticleAlert::from_article(article, severity);
        tracing::info!(
            target: "notify",
            severity = severity.tag(),
            score = alert.score,
            link = %alert.link,
            "alert"
        );

        let mut delivered = 0usize;
        let mut failed = 0usize;
        for sink in &self.sinks {
            match sink.send(&alert).await {
                Ok(()) => {
                    delivered += 1;
                    counter!("notify_sent_total", "sink" => sink.name()).increment(1);
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(target: "notify", sink = sink.name(), error = %e, "alert delivery failed");
                    counter!("notify_errors_total", "sink" => sink.name()).increment(1);
                }
            }
        }
        NotifyOutcome::Dispatched {
            severity,
            delivered,
            failed,
        }
    }
}
