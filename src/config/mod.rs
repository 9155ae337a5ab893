// src/config/mod.rs
//! Application configuration: `config/newsbot.toml` plus env overrides.
//!
//! Lookup order for the file:
//! 1) `$NEWSBOT_CONFIG_PATH`
//! 2) `config/newsbot.toml`
//! 3) built-in defaults
//!
//! Env overrides are applied on top of whatever the file produced.

pub mod scoring;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::filter::{KeywordSet, DEFAULT_SELF_IDENTIFIERS};
use crate::ingest::providers::bulletin::BulletinConfig;
use crate::notify::NotifyConfig;
use scoring::ScoringConfig;

pub const ENV_CONFIG_PATH: &str = "NEWSBOT_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/newsbot.toml";

pub const DEFAULT_FEEDS: &[&str] = &[
    "https://www.nrk.no/toppsaker.rss",
    "https://www.vg.no/rss/feed",
    "https://www.dagbladet.no/rss/nyheter",
    "https://www.e24.no/rss",
    "https://www.nrk.no/vestfoldogtelemark/siste.rss",
    "https://news.google.com/rss/search?q=Telemark+OR+Skien+OR+Porsgrunn+when:1d&hl=no&gl=NO&ceid=NO:no",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub sources: SourcesConfig,
    pub filter: FilterConfig,
    pub scoring: ScoringConfig,
    pub notify: NotifyConfig,
    pub schedule: ScheduleConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: String,
    /// Fixed offset applied to `discovered_at` for display (hours east of UTC).
    pub display_utc_offset_hours: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "newsbot.db".to_string(),
            display_utc_offset_hours: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub feeds: Vec<String>,
    pub fetch_timeout_secs: u64,
    pub bulletin: BulletinConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            feeds: DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect(),
            fetch_timeout_secs: 15,
            bulletin: BulletinConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Comma-delimited; `None` means the built-in regional set.
    pub keywords: Option<String>,
    pub self_identifiers: Vec<String>,
    pub freshness_hours: i64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            keywords: None,
            self_identifiers: DEFAULT_SELF_IDENTIFIERS.iter().map(|s| s.to_string()).collect(),
            freshness_hours: 24,
        }
    }
}

impl FilterConfig {
    pub fn keyword_set(&self) -> KeywordSet {
        match self.keywords.as_deref().map(KeywordSet::parse) {
            Some(ks) if !ks.is_empty() => ks,
            _ => KeywordSet::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// 0 disables the interval driver (on-demand only).
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { interval_secs: 600 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: AppConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(cfg)
    }

    /// File lookup (env path, default path, built-ins) followed by env overrides.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Self::load_from(&default)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }

        if let Some(v) = var("NEWSBOT_DB_PATH") {
            self.store.path = v;
        }
        if let Some(v) = var("NEWSBOT_KEYWORDS") {
            self.filter.keywords = Some(v);
        }
        if let Some(v) = var("NEWSBOT_NOTIFY_THRESHOLD") {
            self.notify.threshold = v
                .trim()
                .parse::<u8>()
                .with_context(|| format!("NEWSBOT_NOTIFY_THRESHOLD={v}"))?
                .min(100);
        }
        if let Some(v) = var("NEWSBOT_WEBHOOK_URL") {
            self.notify.webhook_url = Some(v);
        }
        if let Some(v) = var("DISCORD_WEBHOOK_URL") {
            self.notify.discord_webhook_url = Some(v);
        }
        if let Some(v) = var("NEWSBOT_INTERVAL_SECS") {
            self.schedule.interval_secs = v
                .trim()
                .parse()
                .with_context(|| format!("NEWSBOT_INTERVAL_SECS={v}"))?;
        }
        if let Some(v) = var("NEWSBOT_BIND") {
            self.server.bind = v;
        }
        Ok(())
    }
}
