// src/ingest/providers/bulletin.rs
//! Company-registry bulletin adapter.
//!
//! Searches the announcement board over a rolling window (default 7 days),
//! once per category, and turns every matching anchor into a candidate:
//! anchor text is the company name, `href` resolved against the search page
//! is the link. Anchors with fewer than two visible characters are noise
//! (pager arrows, bullets) and are skipped.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SourceError;
use crate::ingest::types::{CandidateItem, SourceProvider};
use crate::ingest::BROWSER_USER_AGENT;

pub const DEFAULT_SEARCH_URL: &str = "https://w2.brreg.no/kunngjoring/kombisok.jsp?datoFra={from}&datoTil={to}&id_region={region}&id_niva1=51&id_niva2={category}&id_bransje1=0";
pub const DEFAULT_ANCHOR_SELECTOR: &str = r#"a[href*="hent_en.jsp"]"#;
pub const DEFAULT_LABEL: &str = "Brønnøysundregistrene";
const MIN_NAME_CHARS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulletinCategory {
    BankruptcyOpening,
    ForcedLiquidation,
    ForcedDissolution,
    DebtNegotiation,
    Oppbud,
}

impl BulletinCategory {
    pub const ALL: [BulletinCategory; 5] = [
        BulletinCategory::BankruptcyOpening,
        BulletinCategory::ForcedLiquidation,
        BulletinCategory::ForcedDissolution,
        BulletinCategory::DebtNegotiation,
        BulletinCategory::Oppbud,
    ];

    /// Value substituted for `{category}` in the search URL.
    pub fn code(self) -> &'static str {
        match self {
            BulletinCategory::BankruptcyOpening => "konkursapning",
            BulletinCategory::ForcedLiquidation => "tvangsavvikling",
            BulletinCategory::ForcedDissolution => "tvangsopplosning",
            BulletinCategory::DebtNegotiation => "gjeldsforhandling",
            BulletinCategory::Oppbud => "oppbud",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BulletinCategory::BankruptcyOpening => "Konkursåpning",
            BulletinCategory::ForcedLiquidation => "Tvangsavvikling",
            BulletinCategory::ForcedDissolution => "Tvangsoppløsning",
            BulletinCategory::DebtNegotiation => "Gjeldsforhandling",
            BulletinCategory::Oppbud => "Oppbud",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BulletinConfig {
    pub enabled: bool,
    /// Template with `{from}`, `{to}` (dd.mm.yyyy), `{region}` and `{category}`.
    pub search_url: String,
    pub region: String,
    pub categories: Vec<BulletinCategory>,
    pub window_days: i64,
    pub anchor_selector: String,
    pub label: String,
}

impl Default for BulletinConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            region: "8".to_string(),
            categories: BulletinCategory::ALL.to_vec(),
            window_days: 7,
            anchor_selector: DEFAULT_ANCHOR_SELECTOR.to_string(),
            label: DEFAULT_LABEL.to_string(),
        }
    }
}

impl BulletinConfig {
    pub fn search_url_for(&self, category: BulletinCategory, now: DateTime<Utc>) -> String {
        let from = now - ChronoDuration::days(self.window_days);
        self.search_url
            .replace("{from}", &from.format("%d.%m.%Y").to_string())
            .replace("{to}", &now.format("%d.%m.%Y").to_string())
            .replace("{region}", &self.region)
            .replace("{category}", category.code())
    }
}

pub struct BulletinProvider {
    cfg: BulletinConfig,
    client: reqwest::Client,
    fixture: Option<String>,
}

impl BulletinProvider {
    pub fn new(cfg: BulletinConfig, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            cfg,
            client,
            fixture: None,
        }
    }

    /// Serve `html` as the result page for every configured category.
    pub fn from_fixture(cfg: BulletinConfig, html: impl Into<String>) -> Self {
        Self {
            cfg,
            client: reqwest::Client::new(),
            fixture: Some(html.into()),
        }
    }

    async fn page(&self, url: &str) -> Result<String, SourceError> {
        if let Some(html) = &self.fixture {
            return Ok(html.clone());
        }
        let http_err = |source| SourceError::Http {
            url: url.to_string(),
            source,
        };
        let resp = self.client.get(url).send().await.map_err(http_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        resp.text().await.map_err(http_err)
    }

    async fn fetch_at(&self, now: DateTime<Utc>) -> Result<Vec<CandidateItem>, SourceError> {
        let mut out = Vec::new();
        let mut failures = 0usize;
        let mut last_err = None;

        for &category in &self.cfg.categories {
            let url = self.cfg.search_url_for(category, now);
            let scraped = match self.page(&url).await {
                Ok(html) => extract_candidates(&html, &url, &self.cfg.anchor_selector, category, &self.cfg.label),
                Err(e) => Err(e),
            };
            match scraped {
                Ok(mut items) => out.append(&mut items),
                Err(e) => {
                    tracing::warn!(target: "ingest", error = %e, category = category.code(), "bulletin category skipped");
                    counter!("ingest_provider_errors_total").increment(1);
                    failures += 1;
                    last_err = Some(e);
                }
            }
        }

        // Only a fully failed pass counts as a source failure.
        if failures > 0 && failures == self.cfg.categories.len() {
            if let Some(e) = last_err {
                return Err(e);
            }
        }
        counter!("ingest_events_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for BulletinProvider {
    async fn fetch_latest(&self) -> Result<Vec<CandidateItem>, SourceError> {
        self.fetch_at(Utc::now()).await
    }

    fn name(&self) -> &str {
        &self.cfg.label
    }
}

/// Extract one candidate per qualifying anchor on a result page.
pub fn extract_candidates(
    html: &str,
    page_url: &str,
    selector: &str,
    category: BulletinCategory,
    source_label: &str,
) -> Result<Vec<CandidateItem>, SourceError> {
    let base = Url::parse(page_url)?;
    let sel = Selector::parse(selector).map_err(|_| SourceError::Selector(selector.to_string()))?;
    let doc = Html::parse_document(html);

    let mut out = Vec::new();
    for a in doc.select(&sel) {
        let name = a.text().collect::<String>();
        let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
        if name.chars().count() < MIN_NAME_CHARS {
            continue;
        }
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let Ok(link) = base.join(href) else {
            continue;
        };
        out.push(
            CandidateItem::new(format!("{}: {}", category.label(), name), link.as_str(), source_label)
                .with_body(format!("{name} er registrert med {} i {source_label}.", category.label().to_lowercase())),
        );
    }
    Ok(out)
}
