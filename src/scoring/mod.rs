// src/scoring/mod.rs
//! Relevance scoring: prompt → provider call → parsed, clamped verdict.
//!
//! Scoring never fails the pipeline. A missing credential short-circuits to
//! a fixed verdict without any call; a failed, timed-out or unparseable
//! call yields the neutral fallback verdict.

pub mod parse;
pub mod prompt;
pub mod provider;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Datelike;
use metrics::counter;
use serde::Serialize;

use crate::config::scoring::ScoringConfig;
use crate::error::ScoreError;
use crate::scoring::parse::{MarkerParser, ResponseParser};
use crate::scoring::prompt::{build_prompt, PromptContext};
use crate::scoring::provider::{MockProvider, OpenAiProvider, Provider};

/// Score used when the model call fails or its answer is unusable.
pub const FALLBACK_SCORE: u8 = 50;
pub const FALLBACK_REASON: &str = "AI-vurdering feilet, standard score satt";
/// Score used when no scoring credential is configured.
pub const UNCONFIGURED_SCORE: u8 = 50;
pub const UNCONFIGURED_REASON: &str = "Automatisk score (mangler nøkkel)";
/// Justification when the model gave a score but no reason.
pub const MISSING_REASON: &str = "Relevant for regionen";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictOrigin {
    Model,
    Fallback,
    Unconfigured,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreVerdict {
    /// Always within 0..=100.
    pub score: u8,
    pub justification: String,
    pub origin: VerdictOrigin,
}

impl ScoreVerdict {
    pub fn fallback() -> Self {
        Self {
            score: FALLBACK_SCORE,
            justification: FALLBACK_REASON.to_string(),
            origin: VerdictOrigin::Fallback,
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            score: UNCONFIGURED_SCORE,
            justification: UNCONFIGURED_REASON.to_string(),
            origin: VerdictOrigin::Unconfigured,
        }
    }
}

#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Infallible by contract: failures map to a fallback verdict.
    async fn score(&self, title: &str, body: &str, keyword: &str) -> ScoreVerdict;
    fn provider_name(&self) -> &'static str;
}

pub type DynScorer = Arc<dyn RelevanceScorer>;

/// Scorer used when no credential is configured.
pub struct DisabledScorer;

#[async_trait]
impl RelevanceScorer for DisabledScorer {
    async fn score(&self, _title: &str, _body: &str, _keyword: &str) -> ScoreVerdict {
        counter!("scoring_fallbacks_total", "reason" => "unconfigured").increment(1);
        ScoreVerdict::unconfigured()
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Model-backed scorer.
pub struct LlmScorer<P: Provider> {
    provider: P,
    parser: Box<dyn ResponseParser>,
    context: PromptContext,
    timeout: Duration,
}

impl<P: Provider> LlmScorer<P> {
    pub fn new(provider: P, context: PromptContext, timeout: Duration) -> Self {
        Self {
            provider,
            parser: Box::new(MarkerParser::default()),
            context,
            timeout,
        }
    }

    pub fn with_parser(mut self, parser: Box<dyn ResponseParser>) -> Self {
        self.parser = parser;
        self
    }

    async fn try_score(&self, title: &str, body: &str, keyword: &str) -> Result<ScoreVerdict, ScoreError> {
        let year = chrono::Utc::now().year();
        let prompt = build_prompt(&self.context, title, body, keyword, year);

        counter!("scoring_calls_total").increment(1);
        let raw = tokio::time::timeout(self.timeout, self.provider.complete(&prompt))
            .await
            .map_err(|_| ScoreError::Timeout(self.timeout))??;

        let parsed = self
            .parser
            .parse(&raw)
            .ok_or_else(|| ScoreError::Unparseable(crate::ingest::truncate_chars(&raw, 120)))?;

        Ok(ScoreVerdict {
            score: parsed.score.min(100),
            justification: parsed
                .justification
                .unwrap_or_else(|| MISSING_REASON.to_string()),
            origin: VerdictOrigin::Model,
        })
    }
}

#[async_trait]
impl<P: Provider> RelevanceScorer for LlmScorer<P> {
    async fn score(&self, title: &str, body: &str, keyword: &str) -> ScoreVerdict {
        match self.try_score(title, body, keyword).await {
            Ok(v) => v,
            Err(ScoreError::Unconfigured) => {
                counter!("scoring_fallbacks_total", "reason" => "unconfigured").increment(1);
                ScoreVerdict::unconfigured()
            }
            Err(e) => {
                tracing::warn!(target: "scoring", provider = self.provider.name(), error = %e, "scoring failed, using fallback");
                counter!("scoring_fallbacks_total", "reason" => "error").increment(1);
                ScoreVerdict::fallback()
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        self.provider.name()
    }
}

/// Build the scorer for `cfg`.
///
/// * `SCORER_TEST_MODE=mock` → fixed mock answer (no network).
/// * no credential / disabled → [`DisabledScorer`].
/// * otherwise OpenAI.
pub fn build_scorer(cfg: &ScoringConfig) -> DynScorer {
    let context = PromptContext {
        newsroom: cfg.newsroom.clone(),
        region: cfg.region.clone(),
    };
    let timeout = Duration::from_secs(cfg.timeout_secs.max(1));

    if std::env::var("SCORER_TEST_MODE").map(|v| v == "mock").unwrap_or(false) {
        let mock = MockProvider::new("Score: 75\nBegrunnelse: Mock-vurdering");
        return Arc::new(LlmScorer::new(mock, context, timeout));
    }

    let key = cfg.resolved_api_key();
    if !cfg.enabled || key.is_empty() {
        tracing::warn!(target: "scoring", "no scoring credential, running with fixed default score");
        return Arc::new(DisabledScorer);
    }

    let mut provider = OpenAiProvider::new(key, cfg.model.as_deref(), timeout);
    if let Some(base) = &cfg.base_url {
        provider = provider.with_base_url(base.clone());
    }
    Arc::new(LlmScorer::new(provider, context, timeout))
}
