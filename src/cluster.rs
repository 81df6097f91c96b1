//! # Clustering Engine
//! Groups a batch of headlines into events of near-duplicate reports.
//!
//! Pure and deterministic for a given input order:
//! 1. tokenize each title once and build a token → item-index inverted index;
//! 2. walk items left to right; each unassigned item seeds a cluster and pulls in
//!    every later, unassigned item that shares a token and whose Jaccard
//!    similarity to the seed meets the threshold;
//! 3. order members by (tier asc, published desc); the first is the primary;
//! 4. return events newest `last_updated` first.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::collaborators::ThreatClassifier;
use crate::config::ClusteringConfig;
use crate::text::{self, similarity, TokenSet};
use crate::types::{ClusteredEvent, NewsItem, TopSource};

const ID_SLUG_LEN: usize = 40;
const TOP_SOURCES: usize = 3;

/// Cluster `items`; `tier_of` resolves tiers for items that carry none.
pub fn cluster_news<F>(items: &[NewsItem], tier_of: F, cfg: &ClusteringConfig) -> Vec<ClusteredEvent>
where
    F: Fn(&str) -> u8,
{
    if items.is_empty() {
        return Vec::new();
    }

    let tokens: Vec<TokenSet> = items
        .iter()
        .map(|it| text::tokenize_bounded(&it.title, cfg.max_tokens))
        .collect();

    // Index lists are ascending because items are visited in order.
    let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, set) in tokens.iter().enumerate() {
        for tok in set {
            index.entry(tok.as_str()).or_default().push(i);
        }
    }

    let mut assigned = vec![false; items.len()];
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut comparisons = 0usize;

    for i in 0..items.len() {
        if assigned[i] {
            continue;
        }
        assigned[i] = true;
        let mut members = vec![i];

        let mut candidates = BTreeSet::new();
        for tok in &tokens[i] {
            if let Some(list) = index.get(tok.as_str()) {
                let start = list.partition_point(|&j| j <= i);
                candidates.extend(list[start..].iter().copied().filter(|&j| !assigned[j]));
            }
        }

        for j in candidates {
            comparisons += 1;
            if similarity(&tokens[i], &tokens[j]) >= cfg.similarity_threshold {
                assigned[j] = true;
                members.push(j);
            }
        }
        groups.push(members);
    }

    let mut events: Vec<ClusteredEvent> = groups
        .into_iter()
        .map(|idxs| build_event(items, &idxs, &tier_of))
        .collect();

    // Stable: ties keep creation (left-to-right) order.
    events.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));

    debug!(
        target: "cluster",
        items = items.len(),
        events = events.len(),
        comparisons,
        "clustered batch"
    );
    events
}

fn build_event<F>(items: &[NewsItem], idxs: &[usize], tier_of: &F) -> ClusteredEvent
where
    F: Fn(&str) -> u8,
{
    // idxs[0] is the seed; input order is ascending.
    let mut ranked: Vec<(u8, &NewsItem)> = idxs
        .iter()
        .map(|&i| {
            let it = &items[i];
            (it.tier.unwrap_or_else(|| tier_of(&it.source)), it)
        })
        .collect();
    ranked.sort_by(|(ta, a), (tb, b)| ta.cmp(tb).then_with(|| b.published_at.cmp(&a.published_at)));

    let (_, primary) = ranked[0];

    let first_seen = idxs
        .iter()
        .map(|&i| items[i].published_at)
        .min()
        .unwrap_or(primary.published_at);
    let last_updated = idxs
        .iter()
        .map(|&i| items[i].published_at)
        .max()
        .unwrap_or(primary.published_at);

    // Earliest member (first in input order on ties) names the event.
    let earliest = idxs
        .iter()
        .map(|&i| &items[i])
        .min_by_key(|it| it.published_at)
        .unwrap_or(primary);

    let top_sources = ranked
        .iter()
        .take(TOP_SOURCES)
        .map(|(tier, it)| TopSource {
            source: it.source.clone(),
            tier: *tier,
            link: it.link.clone(),
        })
        .collect();

    let geo = dominant_location(idxs.iter().map(|&i| &items[i]));

    ClusteredEvent {
        id: event_id(earliest.published_at, &earliest.title),
        primary_title: primary.title.clone(),
        primary_source: primary.source.clone(),
        primary_link: primary.link.clone(),
        member_count: ranked.len(),
        top_sources,
        all_members: ranked.iter().map(|(_, it)| (*it).clone()).collect(),
        first_seen,
        last_updated,
        is_alert: ranked.iter().any(|(_, it)| it.is_alert),
        lat: geo.map(|(lat, _)| lat),
        lon: geo.map(|(_, lon)| lon),
        threat: None,
    }
}

/// Deterministic id: earliest publish time (ms) + truncated title slug.
pub fn event_id(earliest: DateTime<Utc>, title: &str) -> String {
    let slug = text::slug(title, ID_SLUG_LEN);
    if slug.is_empty() {
        format!("ev-{}", earliest.timestamp_millis())
    } else {
        format!("ev-{}-{}", earliest.timestamp_millis(), slug)
    }
}

/// Most frequent valid (lat, lon) pair; ties go to the first one encountered.
fn dominant_location<'a, I>(members: I) -> Option<(f64, f64)>
where
    I: Iterator<Item = &'a NewsItem>,
{
    let mut counts: Vec<((u64, u64), (f64, f64), usize)> = Vec::new();
    for loc in members.filter_map(|m| m.location).filter(|l| l.is_valid()) {
        let key = (loc.lat.to_bits(), loc.lon.to_bits());
        match counts.iter_mut().find(|(k, _, _)| *k == key) {
            Some(entry) => entry.2 += 1,
            None => counts.push((key, (loc.lat, loc.lon), 1)),
        }
    }
    let mut best: Option<((f64, f64), usize)> = None;
    for (_, pair, n) in counts {
        if best.map_or(true, |(_, b)| n > b) {
            best = Some((pair, n));
        }
    }
    best.map(|(pair, _)| pair)
}

/// Attach a threat classification to each event. A failing classifier leaves
/// that event unannotated.
pub fn annotate_threats(mut events: Vec<ClusteredEvent>, classifier: &dyn ThreatClassifier) -> Vec<ClusteredEvent> {
    for ev in events.iter_mut() {
        match classifier.aggregate_threats_for_cluster(&ev.all_members) {
            Ok(threat) => ev.threat = threat,
            Err(e) => {
                warn!(target: "cluster", event = %ev.id, error = ?e, "threat classifier failed");
                counter!("correlation_collaborator_errors_total", "collaborator" => "threat").increment(1);
            }
        }
    }
    events
}
