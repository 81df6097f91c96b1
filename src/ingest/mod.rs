// src/ingest/mod.rs
//! Batch intake: normalize headlines and hand the engine a clean,
//! deduplicated, time-ordered batch.

pub mod file;
pub mod types;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

pub use file::JsonFileSource;
pub use types::{BatchSource, CycleBatch};

pub const MAX_TITLE_CHARS: usize = 300;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "News items received before preparation.");
        describe_counter!("ingest_kept_total", "News items kept after normalization and dedup.");
        describe_counter!("ingest_filtered_total", "Items dropped as empty or non-finite.");
        describe_counter!("ingest_dedup_total", "News items dropped as exact duplicate titles.");
        describe_gauge!("ingest_last_batch_ts", "Unix ts of the last prepared batch.");
    });
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Headline cleanup: HTML entities, tags, typographic quotes, whitespace,
/// trailing punctuation, length cap.
pub fn normalize_title(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let stripped = RE_TAGS.replace_all(&decoded, "");

    // “ ” « » → ", ‘ ’ → '
    let quoted = stripped
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    let mut out = RE_WS.replace_all(&quoted, " ").trim().to_string();

    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',' | ';' | ':') {
            out.pop();
        } else {
            break;
        }
    }
    let out = out.trim_end().to_string();

    if out.chars().count() > MAX_TITLE_CHARS {
        return out.chars().take(MAX_TITLE_CHARS).collect();
    }
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareStats {
    pub kept: usize,
    pub filtered: usize,
    pub deduped: usize,
}

/// Normalize titles, drop empty titles and non-finite quotes, drop exact
/// duplicate titles (first wins), sort news oldest first.
pub fn prepare_batch(mut batch: CycleBatch) -> (CycleBatch, PrepareStats) {
    ensure_metrics_described();
    let received = batch.news.len();
    let mut stats = PrepareStats::default();

    let mut seen: HashSet<String> = HashSet::new();
    let mut news = Vec::with_capacity(batch.news.len());
    for mut item in batch.news.drain(..) {
        item.title = normalize_title(&item.title);
        item.source = item.source.trim().to_string();
        if item.title.is_empty() {
            stats.filtered += 1;
            continue;
        }
        if item.location.is_some_and(|l| !l.is_valid()) {
            item.location = None;
        }
        if !seen.insert(item.title.to_lowercase()) {
            stats.deduped += 1;
            continue;
        }
        news.push(item);
    }
    // Stable, so equal timestamps keep arrival order.
    news.sort_by_key(|n| n.published_at);
    stats.kept = news.len();

    let before_quotes = batch.predictions.len() + batch.markets.len();
    batch.predictions.retain_mut(|p| {
        p.title = normalize_title(&p.title);
        !p.title.is_empty() && p.yes_price.is_finite() && p.volume.map_or(true, f64::is_finite)
    });
    batch.markets.retain(|m| {
        !m.symbol.trim().is_empty()
            && m.price.map_or(true, f64::is_finite)
            && m.change_percent.map_or(true, f64::is_finite)
    });
    stats.filtered += before_quotes - batch.predictions.len() - batch.markets.len();

    counter!("ingest_items_total").increment(received as u64);
    counter!("ingest_kept_total").increment(stats.kept as u64);
    counter!("ingest_filtered_total").increment(stats.filtered as u64);
    counter!("ingest_dedup_total").increment(stats.deduped as u64);
    gauge!("ingest_last_batch_ts").set(chrono::Utc::now().timestamp() as f64);
    debug!(
        target: "ingest",
        kept = stats.kept,
        filtered = stats.filtered,
        deduped = stats.deduped,
        "batch prepared"
    );

    batch.news = news;
    (batch, stats)
}
