// src/scoring/parse.rs
//! Turning free-text model output into a bounded score.

use crate::ingest::truncate_chars;

pub const MAX_JUSTIFICATION_CHARS: usize = 200;

/// Parsed model answer. `justification` is `None` when the model gave none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedScore {
    pub score: u8,
    pub justification: Option<String>,
}

/// Swappable parsing strategy (marker text today, structured output later).
pub trait ResponseParser: Send + Sync {
    /// `None` means the response carries no usable score.
    fn parse(&self, raw: &str) -> Option<ParsedScore>;
}

/// Marker contract: the first digit run after `Score:` is the score (clamped
/// to 0..=100), the text after `Begrunnelse:` is the justification.
/// Markers match ASCII-case-insensitively.
#[derive(Debug, Clone)]
pub struct MarkerParser {
    score_markers: Vec<String>,
    reason_markers: Vec<String>,
}

impl Default for MarkerParser {
    fn default() -> Self {
        Self {
            score_markers: vec!["score:".into()],
            reason_markers: vec!["begrunnelse:".into(), "justification:".into()],
        }
    }
}

/// Byte span (start, end) of the first marker found.
fn find_marker(lower: &str, markers: &[String]) -> Option<(usize, usize)> {
    markers
        .iter()
        .filter_map(|m| lower.find(m.as_str()).map(|i| (i, i + m.len())))
        .min_by_key(|(start, _)| *start)
}

impl ResponseParser for MarkerParser {
    fn parse(&self, raw: &str) -> Option<ParsedScore> {
        // ASCII lowering keeps byte offsets valid for `raw`.
        let lower = raw.to_ascii_lowercase();
        let (_, score_end) = find_marker(&lower, &self.score_markers)?;
        let reason = find_marker(&lower, &self.reason_markers);

        // Digits must come before a justification that follows the score.
        let score_region = match reason {
            Some((r_start, _)) if r_start > score_end => &raw[score_end..r_start],
            _ => &raw[score_end..],
        };
        let start = score_region.find(|c: char| c.is_ascii_digit())?;
        let digits: String = score_region[start..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        // Overflowing digit runs are "above 100" too.
        let value = digits.parse::<u32>().unwrap_or(u32::MAX).min(100) as u8;

        let justification = reason.and_then(|(r_start, r_end)| {
            let tail = &raw[r_end..];
            // Cut a score line that follows the justification.
            let tail = match find_marker(&lower[r_end..], &self.score_markers) {
                Some((s_start, _)) if r_start < score_end => &tail[..s_start],
                _ => tail,
            };
            sanitize_justification(tail)
        });

        Some(ParsedScore {
            score: value,
            justification,
        })
    }
}

/// Single line, collapsed whitespace, bounded length. Empty → `None`.
pub fn sanitize_justification(input: &str) -> Option<String> {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c == '[' || c == ']' || c == '"' || c.is_whitespace());
    if trimmed.is_empty() {
        return None;
    }
    Some(truncate_chars(trimmed, MAX_JUSTIFICATION_CHARS))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Option<ParsedScore> {
        MarkerParser::default().parse(s)
    }

    #[test]
    fn score_and_reason_on_one_line() {
        let p = parse("Score: 95 Begrunnelse: Stor lokal hendelse").unwrap();
        assert_eq!(p.score, 95);
        assert_eq!(p.justification.as_deref(), Some("Stor lokal hendelse"));
    }

    #[test]
    fn multi_line_with_brackets() {
        let p = parse("Score: [72]\nBegrunnelse: [Trafikkulykke på E18]\n").unwrap();
        assert_eq!(p.score, 72);
        assert_eq!(p.justification.as_deref(), Some("Trafikkulykke på E18"));
    }

    #[test]
    fn above_range_is_clamped() {
        assert_eq!(parse("Score: 150").unwrap().score, 100);
        assert_eq!(parse("Score: 99999999999999999999").unwrap().score, 100);
    }

    #[test]
    fn missing_marker_or_digits_fail() {
        assert!(parse("Denne saken er relevant, 80 poeng").is_none());
        assert!(parse("Score: høy\nBegrunnelse: 2 biler kolliderte").is_none());
    }

    #[test]
    fn reason_before_score_is_cut_at_score() {
        let p = parse("Begrunnelse: Gammel sak\nScore: 0").unwrap();
        assert_eq!(p.score, 0);
        assert_eq!(p.justification.as_deref(), Some("Gammel sak"));
    }

    #[test]
    fn markers_are_case_insensitive() {
        let p = parse("SCORE: 41 justification: weak link").unwrap();
        assert_eq!(p.score, 41);
        assert_eq!(p.justification.as_deref(), Some("weak link"));
    }

    #[test]
    fn long_justification_is_bounded() {
        let long = format!("Score: 50 Begrunnelse: {}", "ø".repeat(500));
        let p = parse(&long).unwrap();
        assert_eq!(p.justification.unwrap().chars().count(), MAX_JUSTIFICATION_CHARS);
    }
}
