//! Text normalization — strip markup, mentions, URLs; drop non-content.
//!
//! Pure functions: degenerate input yields `None`, never an error, and
//! null-normalized messages are excluded from all downstream stages.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::constants::{DUPLICATE_SIMILARITY_THRESHOLD, MIN_NORMALIZED_CHARS, MIN_NORMALIZED_WORDS};

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://[^\s]+").unwrap())
}

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[@#]\w+").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Emoji and pictograph codepoints stripped before analysis.
fn is_emoji(c: char) -> bool {
    matches!(c,
        '\u{1F000}'..='\u{1FAFF}'
        | '\u{2600}'..='\u{27BF}'
        | '\u{2190}'..='\u{21FF}'
        | '\u{2B00}'..='\u{2BFF}'
        | '\u{FE00}'..='\u{FE0F}'
        | '\u{200D}'
    )
}

/// Normalize one raw message.
///
/// Returns `None` when the message carries no analyzable content: empty,
/// pure media caption, pure mention, or too little text after stripping.
pub fn normalize(raw: &str) -> Option<String> {
    if raw.trim().is_empty() {
        return None;
    }

    let no_urls = url_re().replace_all(raw, "");
    let no_mentions = mention_re().replace_all(&no_urls, "");
    let no_emoji: String = no_mentions.chars().filter(|c| !is_emoji(*c)).collect();

    let lower = no_emoji.to_lowercase();
    let collapsed = whitespace_re().replace_all(lower.trim(), " ").to_string();

    if collapsed.chars().count() < MIN_NORMALIZED_CHARS {
        return None;
    }
    if collapsed.split_whitespace().count() < MIN_NORMALIZED_WORDS {
        return None;
    }

    Some(collapsed)
}

/// Jaccard similarity over word sets of two normalized texts.
fn jaccard(a: &str, b: &str) -> f64 {
    let wa: HashSet<&str> = a.split_whitespace().collect();
    let wb: HashSet<&str> = b.split_whitespace().collect();
    if wa.is_empty() || wb.is_empty() {
        return 0.0;
    }
    let intersection = wa.intersection(&wb).count();
    let union = wa.union(&wb).count();
    intersection as f64 / union as f64
}

/// Indices of messages surviving near-duplicate suppression.
///
/// First occurrence wins; later texts too similar to any survivor are
/// dropped. Deterministic for a fixed input order.
pub fn dedup_indices(normalized: &[&str]) -> Vec<usize> {
    let mut kept: Vec<usize> = Vec::new();
    for (i, text) in normalized.iter().enumerate() {
        let duplicate = kept
            .iter()
            .any(|&k| jaccard(normalized[k], text) > DUPLICATE_SIMILARITY_THRESHOLD);
        if !duplicate {
            kept.push(i);
        }
    }
    kept
}
