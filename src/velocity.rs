//! # Topic Velocity
//! Per-topic activity for the current cycle plus a bounded, time-windowed
//! history used as the spike baseline.
//!
//! Nothing here holds state: history comes in from the previous snapshot and
//! goes out in the next one.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::{TopicVocabulary, VelocityConfig};
use crate::text::contains_lower;
use crate::types::ClusteredEvent;

/// Topic → activity score for one cycle.
pub type TopicActivity = BTreeMap<String, f64>;

/// Topic → ordered (oldest first) velocity points.
pub type VelocityHistory = BTreeMap<String, Vec<VelocityPoint>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityPoint {
    pub timestamp: DateTime<Utc>,
    pub velocity: f64,
}

/// Distinct member sources per hour over the event's publish span
/// (span floored at one hour).
pub fn event_velocity(event: &ClusteredEvent) -> f64 {
    let sources: BTreeSet<String> = event
        .all_members
        .iter()
        .map(|m| m.source.trim().to_lowercase())
        .collect();
    let span_hours = (event.last_updated - event.first_seen).num_seconds().max(0) as f64 / 3600.0;
    sources.len() as f64 / span_hours.max(1.0)
}

/// Sum `event_velocity + member_count` into every topic whose keyword appears
/// in the event's primary title (case-insensitive substring).
pub fn extract_topic_activity(events: &[ClusteredEvent], vocab: &TopicVocabulary) -> TopicActivity {
    let topics = vocab.active_topics();
    let mut out = TopicActivity::new();
    for ev in events {
        let title = ev.primary_title.to_lowercase();
        let weight = event_velocity(ev) + ev.member_count as f64;
        for topic in &topics {
            if contains_lower(&title, topic) {
                *out.entry(topic.clone()).or_insert(0.0) += weight;
            }
        }
    }
    out
}

/// Points still inside the window ending at `now`.
pub fn prune_history(points: &[VelocityPoint], now: DateTime<Utc>, window: Duration) -> Vec<VelocityPoint> {
    let cutoff = now - window;
    points.iter().filter(|p| p.timestamp >= cutoff).copied().collect()
}

/// Prune to the window, append one point per known topic (absent topics get 0),
/// and cap each series (oldest dropped first).
///
/// Not every topic of `previous` survives: one whose points all fell outside
/// the window and that is quiet this cycle is dropped rather than given a 0
/// point, so dead topics do not linger in the snapshot.
pub fn update_history(
    previous: &VelocityHistory,
    current: &TopicActivity,
    now: DateTime<Utc>,
    cfg: &VelocityConfig,
) -> VelocityHistory {
    let window = Duration::days(cfg.history_window_days);
    let mut next = VelocityHistory::new();

    for (topic, points) in previous {
        let kept = prune_history(points, now, window);
        if !kept.is_empty() {
            next.insert(topic.clone(), kept);
        }
    }
    for topic in current.keys() {
        next.entry(topic.clone()).or_default();
    }

    for (topic, series) in next.iter_mut() {
        series.push(VelocityPoint {
            timestamp: now,
            velocity: current.get(topic).copied().unwrap_or(0.0),
        });
        if series.len() > cfg.history_cap {
            let excess = series.len() - cfg.history_cap;
            series.drain(0..excess);
        }
    }
    next
}

/// Mean of the stored velocities; 0.0 for empty history.
pub fn average_velocity(points: &[VelocityPoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(|p| p.velocity).sum::<f64>() / points.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpikeAssessment {
    pub current: f64,
    /// None on cold start (no usable history).
    pub baseline: Option<f64>,
    pub multiplier: Option<f64>,
}

/// A topic spikes when it is above the absolute floor and above
/// `baseline × multiplier`; without a baseline only the floor applies.
pub fn assess_spike(
    current: f64,
    history: &[VelocityPoint],
    now: DateTime<Utc>,
    cfg: &VelocityConfig,
) -> Option<SpikeAssessment> {
    if !(current > cfg.spike_floor) {
        return None;
    }
    let pruned = prune_history(history, now, Duration::days(cfg.history_window_days));
    let baseline = average_velocity(&pruned);
    if pruned.is_empty() || baseline <= 0.0 {
        return Some(SpikeAssessment {
            current,
            baseline: None,
            multiplier: None,
        });
    }
    if current > baseline * cfg.spike_multiplier {
        Some(SpikeAssessment {
            current,
            baseline: Some(baseline),
            multiplier: Some(current / baseline),
        })
    } else {
        None
    }
}
