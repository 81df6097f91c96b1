//! # Tokenizer / Similarity
//! Normalizes headlines into comparable token sets and scores their overlap.
//!
//! - `tokenize` lowercases, splits on anything that is not a letter or digit,
//!   drops tokens of two characters or fewer and common stopwords.
//! - `similarity` is the Jaccard index of two token sets.
//!
//! Both are pure and deterministic.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Token sets larger than this are truncated (first-seen order) so the
/// clustering worst case stays bounded.
pub const MAX_TOKENS_PER_TITLE: usize = 64;

pub type TokenSet = HashSet<String>;

static RE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("tokenizer regex"));

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "this", "are", "was", "were", "has", "have",
    "had", "its", "into", "over", "after", "amid", "says", "said", "will", "than", "but", "not",
    "you", "your", "our", "their", "they", "his", "her", "she", "him", "who", "what", "when",
    "where", "why", "how", "all", "can", "could", "would", "should", "about", "more", "most",
    "new", "out", "off", "also", "just", "been", "being", "there", "here", "these", "those",
    "which", "while", "per", "via", "news", "report", "reports",
];

static STOPWORD_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| STOPWORDS.iter().copied().collect());

/// Tokenize with the default cap.
pub fn tokenize(text: &str) -> TokenSet {
    tokenize_bounded(text, MAX_TOKENS_PER_TITLE)
}

/// Tokenize keeping at most `max_tokens` distinct tokens.
pub fn tokenize_bounded(text: &str, max_tokens: usize) -> TokenSet {
    let lower = text.to_lowercase();
    let mut out = TokenSet::new();
    for m in RE_WORD.find_iter(&lower) {
        if out.len() >= max_tokens {
            break;
        }
        let w = m.as_str();
        if w.chars().count() <= 2 || STOPWORD_SET.contains(w) {
            continue;
        }
        out.insert(w.to_string());
    }
    out
}

/// Jaccard index `|a ∩ b| / |a ∪ b|`; 0.0 if either side is empty.
pub fn similarity(a: &TokenSet, b: &TokenSet) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let inter = small.iter().filter(|t| large.contains(*t)).count();
    let union = a.len() + b.len() - inter;
    inter as f64 / union as f64
}

/// Lowercase ASCII slug of at most `max_len` chars, words joined by `-`.
pub fn slug(text: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(max_len);
    for word in RE_WORD.find_iter(&text.to_lowercase()) {
        let w: String = word
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        if w.is_empty() {
            continue;
        }
        let sep = usize::from(!out.is_empty());
        if out.len() + sep + w.len() > max_len {
            let room = max_len.saturating_sub(out.len() + sep);
            if room > 0 {
                if sep == 1 {
                    out.push('-');
                }
                out.push_str(&w[..room]);
            }
            break;
        }
        if sep == 1 {
            out.push('-');
        }
        out.push_str(&w);
    }
    out
}

/// Case-insensitive substring check against an already-lowercased needle.
pub(crate) fn contains_lower(haystack_lower: &str, needle_lower: &str) -> bool {
    !needle_lower.is_empty() && haystack_lower.contains(needle_lower)
}

/// Lowercased words joined by single spaces, for phrase matching.
pub fn word_line(text: &str) -> String {
    let lower = text.to_lowercase();
    RE_WORD
        .find_iter(&lower)
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `phrase` occurs in `line` on word boundaries; both come from [`word_line`].
pub fn contains_phrase(line: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    format!(" {line} ").contains(&format!(" {phrase} "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> TokenSet {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn case_and_punctuation_normalize() {
        assert_eq!(tokenize("Iran Strikes Back!"), tokenize("iran strikes back"));
        assert_eq!(tokenize("Iran Strikes Back!"), set(&["iran", "strikes", "back"]));
    }

    #[test]
    fn short_tokens_and_stopwords_dropped() {
        let t = tokenize("US and EU say the talks are over");
        assert_eq!(t, set(&["say", "talks"]));
    }

    #[test]
    fn possessive_splits_cleanly() {
        let t = tokenize("Iran's navy");
        assert_eq!(t, set(&["iran", "navy"]));
    }

    #[test]
    fn token_cap_is_enforced() {
        let long = (0..200).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        assert_eq!(tokenize(&long).len(), MAX_TOKENS_PER_TITLE);
        assert_eq!(tokenize_bounded(&long, 5).len(), 5);
    }

    #[test]
    fn jaccard_basics() {
        let a = set(&["oil", "prices", "surge"]);
        let b = set(&["oil", "prices", "fall"]);
        assert!((similarity(&a, &b) - 0.5).abs() < 1e-9);
        assert!((similarity(&a, &a) - 1.0).abs() < 1e-9);
        assert_eq!(similarity(&a, &TokenSet::new()), 0.0);
        assert_eq!(similarity(&TokenSet::new(), &TokenSet::new()), 0.0);
    }

    #[test]
    fn phrases_match_on_word_boundaries() {
        let line = word_line("Nord Stream flows CUT after blast");
        assert_eq!(line, "nord stream flows cut after blast");
        assert!(contains_phrase(&line, "nord stream"));
        assert!(contains_phrase(&line, "cut"));
        assert!(!contains_phrase(&word_line("Officials execute plan"), "cut"));
        assert!(!contains_phrase(&line, ""));
    }

    #[test]
    fn slug_truncates_on_ascii() {
        assert_eq!(slug("Iran Strikes Back!", 64), "iran-strikes-back");
        assert_eq!(slug("Iran Strikes Back!", 8), "iran-str");
        assert_eq!(slug("Čína: výstraha", 32), "na-vstraha");
    }
}
