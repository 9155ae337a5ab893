// src/ingest/providers/rss.rs
//! Standard feed adapter: RSS 2.0 (`rss/channel/item`) and Atom (`feed/entry`).

use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::error::SourceError;
use crate::ingest::types::{CandidateItem, SourceProvider};
use crate::ingest::BROWSER_USER_AGENT;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    title: Option<AtomText>,
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}

/// Fetches one feed URL (or parses a fixture) into candidates.
pub struct RssFeedProvider {
    url: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client },
}

impl RssFeedProvider {
    /// Parse fixed XML instead of fetching; `url` is only used as the label fallback.
    pub fn from_fixture(url: impl Into<String>, xml: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: Mode::Fixture(xml.into()),
        }
    }

    pub fn from_url(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self::with_client(url, client)
    }

    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            mode: Mode::Http { client },
        }
    }

    async fn download(&self, client: &reqwest::Client) -> Result<String, SourceError> {
        let http_err = |source| SourceError::Http {
            url: self.url.clone(),
            source,
        };
        let resp = client.get(&self.url).send().await.map_err(http_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        resp.text().await.map_err(http_err)
    }

    fn parse(&self, xml: &str) -> Result<Vec<CandidateItem>, SourceError> {
        let t0 = std::time::Instant::now();
        let xml = scrub_html_entities_for_xml(xml);
        let items = parse_feed(&xml, &self.url)?;
        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_events_total").increment(items.len() as u64);
        Ok(items)
    }
}

#[async_trait]
impl SourceProvider for RssFeedProvider {
    async fn fetch_latest(&self) -> Result<Vec<CandidateItem>, SourceError> {
        match &self.mode {
            Mode::Fixture(xml) => self.parse(xml),
            Mode::Http { client } => {
                let body = self.download(client).await?;
                self.parse(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.url
    }
}

/// Parse an RSS 2.0 or Atom document. The feed's own title becomes the
/// source label; `fallback_label` is used when it has none.
pub fn parse_feed(xml: &str, fallback_label: &str) -> Result<Vec<CandidateItem>, SourceError> {
    let parse_err = |e: quick_xml::DeError| SourceError::Parse {
        url: fallback_label.to_string(),
        reason: e.to_string(),
    };

    let head: String = xml.chars().take(512).collect();
    if head.contains("<feed") && !head.contains("<rss") {
        let feed: AtomFeed = from_str(xml).map_err(parse_err)?;
        return Ok(atom_items(feed, fallback_label));
    }
    let rss: Rss = from_str(xml).map_err(parse_err)?;
    Ok(rss_items(rss, fallback_label))
}

fn label_or(title: Option<&str>, fallback: &str) -> String {
    match title.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => fallback.to_string(),
    }
}

fn rss_items(rss: Rss, fallback_label: &str) -> Vec<CandidateItem> {
    let label = label_or(rss.channel.title.as_deref(), fallback_label);
    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        // A guid is only a usable identity when it looks like a link.
        let link = it
            .link
            .filter(|l| !l.trim().is_empty())
            .or(it.guid.filter(|g| g.starts_with("http")));
        let Some(link) = link else {
            continue;
        };
        let mut item = CandidateItem::new(
            it.title.unwrap_or_default(),
            link.trim(),
            label.clone(),
        )
        .with_body(it.description.unwrap_or_default());
        if let Some(pd) = it.pub_date {
            item = item.with_published(pd);
        }
        out.push(item);
    }
    out
}

fn atom_items(feed: AtomFeed, fallback_label: &str) -> Vec<CandidateItem> {
    let label = label_or(feed.title.as_ref().map(|t| t.value.as_str()), fallback_label);
    let mut out = Vec::with_capacity(feed.entry.len());
    for e in feed.entry {
        let link = e
            .links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or(e.links.first())
            .and_then(|l| l.href.clone());
        let Some(link) = link else {
            continue;
        };
        let body = e
            .summary
            .or(e.content)
            .map(|t| t.value)
            .unwrap_or_default();
        let mut item = CandidateItem::new(
            e.title.map(|t| t.value).unwrap_or_default(),
            link.trim(),
            label.clone(),
        )
        .with_body(body);
        if let Some(ts) = e.published.or(e.updated) {
            item = item.with_published(ts);
        }
        out.push(item);
    }
    out
}

/// XML knows only five named entities; feeds regularly ship HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&laquo;", "\"")
        .replace("&raquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&aring;", "å")
        .replace("&oslash;", "ø")
        .replace("&aelig;", "æ")
        .replace("&Aring;", "Å")
        .replace("&Oslash;", "Ø")
        .replace("&AElig;", "Æ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rss_channel_title_becomes_label() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>NRK Vestfold og Telemark</title>
<item><title>Brann i Skien</title><link>https://www.nrk.no/a</link>
<pubDate>Tue, 06 Oct 2026 08:30:00 +0200</pubDate><description>Full fyr</description></item>
<item><title>Uten lenke</title></item>
</channel></rss>"#;
        let items = parse_feed(xml, "https://www.nrk.no/rss").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source_label, "NRK Vestfold og Telemark");
        assert_eq!(items[0].link, "https://www.nrk.no/a");
        assert!(items[0].published_at.is_some());
    }

    #[test]
    fn atom_entries_use_alternate_link() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"><title type="text">Lokalt</title>
<entry><title>Ny bru</title>
<link rel="self" href="https://x.no/self"/><link rel="alternate" href="https://x.no/bru"/>
<updated>2026-10-06T06:30:00Z</updated><summary>Breviksbrua stengt</summary></entry>
</feed>"#;
        let items = parse_feed(xml, "fallback").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].link, "https://x.no/bru");
        assert_eq!(items[0].source_label, "Lokalt");
        assert_eq!(items[0].body, "Breviksbrua stengt");
    }

    #[test]
    fn broken_xml_is_a_parse_error() {
        let err = parse_feed("<rss><channel>", "u").unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }

    #[test]
    fn html_entities_are_scrubbed_before_parsing() {
        let xml = "<rss><channel><title>T</title><item><title>A&nbsp;B</title><link>https://l</link></item></channel></rss>";
        let items = parse_feed(&scrub_html_entities_for_xml(xml), "u").unwrap();
        assert_eq!(items[0].title, "A B");
    }
}
