// src/scoring/provider.rs
//! Completion providers: the only place that talks to the model service.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ScoreError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ScoreError>> + Send + 'a>>;

/// Low-level provider: one prompt in, raw model text out.
pub trait Provider: Send + Sync + 'static {
    fn complete<'a>(&'a self, prompt: &'a str) -> CompletionFuture<'a>;
    fn name(&self) -> &'static str;
}

/// OpenAI Chat Completions provider.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, model: Option<&str>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("regional-newsbot/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key: api_key.into(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        }
    }

    /// Point at another OpenAI-compatible endpoint (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

impl Provider for OpenAiProvider {
    fn complete<'a>(&'a self, prompt: &'a str) -> CompletionFuture<'a> {
        Box::pin(async move {
            if self.api_key.trim().is_empty() {
                return Err(ScoreError::Unconfigured);
            }
            let req = Req {
                model: &self.model,
                messages: vec![Msg {
                    role: "user",
                    content: prompt,
                }],
                temperature: 0.2,
                max_tokens: 120,
            };

            let resp = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                return Err(ScoreError::Status(status.as_u16()));
            }
            let body: Resp = resp.json().await?;
            Ok(body
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default())
        })
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Fixed-answer provider for tests and `SCORER_TEST_MODE=mock`.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl MockProvider {
    pub fn new(fixed: impl Into<String>) -> Self {
        Self {
            fixed: fixed.into(),
        }
    }
}

impl Provider for MockProvider {
    fn complete<'a>(&'a self, _prompt: &'a str) -> CompletionFuture<'a> {
        let out = self.fixed.clone();
        Box::pin(async move { Ok(out) })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
