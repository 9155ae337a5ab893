// src/config/scoring.rs
use serde::{Deserialize, Serialize};
use std::env;

fn default_timeout_secs() -> u64 {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub enabled: bool,
    /// Only "openai" is wired; anything else runs in default-score mode.
    pub provider: String,
    pub model: Option<String>,
    /// Literal key, or "ENV" (or empty) to read `OPENAI_API_KEY`.
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Own outlet, used in the prompt and as prompt persona.
    pub newsroom: String,
    pub region: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "openai".to_string(),
            model: None,
            api_key: "ENV".to_string(),
            base_url: None,
            timeout_secs: default_timeout_secs(),
            newsroom: "Telemarksavisa".to_string(),
            region: "Telemark".to_string(),
        }
    }
}

impl ScoringConfig {
    /// The credential to use, or an empty string when none is available.
    pub fn resolved_api_key(&self) -> String {
        if !self.provider.eq_ignore_ascii_case("openai") {
            return String::new();
        }
        let raw = self.api_key.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("env") {
            return env::var("OPENAI_API_KEY")
                .map(|k| k.trim().to_string())
                .unwrap_or_default();
        }
        raw.to_string()
    }
}
