// src/ingest/mod.rs
pub mod providers;
pub mod types;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;

/// Browser-like agent; several Norwegian outlets refuse default client agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Strip HTML from feed text: decode entities, drop tags, collapse whitespace.
pub fn clean_html(s: &str) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)<[^>]*>").expect("tag regex"));
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("ws regex"));

    // Tags first: encoded markup (`&lt;b&gt;`) is text, not markup.
    let out = re_tags.replace_all(s, " ");
    let out = html_escape::decode_html_entities(&out);
    let out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Truncate to at most `max` chars, on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}

/// Best-effort publish date parsing: RFC 2822 (RSS) then RFC 3339 (Atom).
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
