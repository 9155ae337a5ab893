// src/filter.rs
//! Candidate filters, applied in pipeline order: freshness, self-exclusion,
//! keyword match.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::ingest::types::CandidateItem;

/// Built-in regional terms (Telemark). Order is match priority.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "Telemark", "Skien", "Porsgrunn", "Bamble", "Kragerø", "Notodden", "Tinn", "Vinje", "Nome",
    "Seljord", "Kviteseid", "Nissedal", "Fyresdal", "Tokke", "Hjartdal", "Bø", "Sauherad",
    "Grenland", "Vest-Telemark", "Øst-Telemark", "Midt-Telemark", "E18", "E134", "Riksvei 36",
    "Fylkesvei", "Gullknapp", "Geiteryggen", "Breviksbrua", "Grenlandsbrua", "Yara", "Herøya",
    "Hydro", "Equinor", "Sykehuset Telemark", "Universitetet i Sørøst-Norge", "Skagerak Energi",
    "Odd", "Urædd", "Pors", "Notodden FK",
];

pub const DEFAULT_SELF_IDENTIFIERS: &[&str] = &["telemarksavisa", "ta.no"];

/* ----------------------------
Freshness
---------------------------- */

#[derive(Debug, Clone, Copy)]
pub struct Freshness {
    cutoff: Duration,
}

impl Default for Freshness {
    fn default() -> Self {
        Self::new(24)
    }
}

impl Freshness {
    pub fn new(cutoff_hours: i64) -> Self {
        Self {
            cutoff: Duration::try_hours(cutoff_hours.max(0)).unwrap_or(Duration::MAX),
        }
    }

    /// Items without a usable timestamp get the benefit of the doubt.
    pub fn accepts(&self, item: &CandidateItem, now: DateTime<Utc>) -> bool {
        match item.published_at {
            Some(ts) => now.checked_sub_signed(self.cutoff).map_or(true, |floor| ts >= floor),
            None => true,
        }
    }
}

/* ----------------------------
Self-exclusion
---------------------------- */

#[derive(Debug, Clone)]
pub struct SelfExclusion {
    tokens: Vec<String>,
}

impl Default for SelfExclusion {
    fn default() -> Self {
        Self::new(DEFAULT_SELF_IDENTIFIERS.iter().copied())
    }
}

impl SelfExclusion {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// True when the item is attributable to our own publication.
    pub fn excludes(&self, item: &CandidateItem) -> bool {
        let fields = [
            item.title.to_lowercase(),
            item.source_label.to_lowercase(),
            item.link.to_lowercase(),
        ];
        self.tokens
            .iter()
            .any(|tok| fields.iter().any(|f| f.contains(tok.as_str())))
    }
}

/* ----------------------------
Keywords
---------------------------- */

/// Ordered, case-insensitively unique keyword list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSet(Vec<String>);

impl Default for KeywordSet {
    fn default() -> Self {
        Self::from_terms(DEFAULT_KEYWORDS.iter().copied())
    }
}

impl KeywordSet {
    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for t in terms {
            let t = t.as_ref().trim();
            if t.is_empty() || out.iter().any(|k| k.to_lowercase() == t.to_lowercase()) {
                continue;
            }
            out.push(t.to_string());
        }
        Self(out)
    }

    /// Parse the editable comma-delimited form (`"Skien, Porsgrunn, Bø"`).
    pub fn parse(list: &str) -> Self {
        Self::from_terms(list.split(','))
    }

    pub fn to_delimited(&self) -> String {
        self.0.join(", ")
    }

    pub fn terms(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Whole-word, case-insensitive matcher. Patterns are compiled once per
/// keyword set.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    patterns: Vec<(String, Regex)>,
}

impl KeywordMatcher {
    pub fn new(keywords: &KeywordSet) -> Self {
        let patterns = keywords
            .terms()
            .iter()
            .filter_map(|k| {
                // `\b` misbehaves for terms that start or end in punctuation,
                // so bound on "start/end or non-word char" instead.
                let pat = format!(r"(?iu)(?:^|\W){}(?:\W|$)", regex::escape(&k.to_lowercase()));
                match Regex::new(&pat) {
                    Ok(re) => Some((k.clone(), re)),
                    Err(e) => {
                        tracing::warn!(keyword = %k, error = %e, "keyword skipped");
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    /// First keyword (in set order) found as a whole word in `text`.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(&haystack))
            .map(|(k, _)| k.as_str())
    }

    /// Matches against cleaned title + body.
    pub fn match_item(&self, item: &CandidateItem) -> Option<&str> {
        let text = format!(
            "{} {}",
            crate::ingest::clean_html(&item.title),
            crate::ingest::clean_html(&item.body)
        );
        self.first_match(&text)
    }
}
