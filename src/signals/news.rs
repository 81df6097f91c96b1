//! News-side rules: velocity spikes and the per-event source-mix rules.

use chrono::Duration;
use std::collections::BTreeSet;

use super::{Candidate, CorrelationSignal, DetectorContext, SignalData, SignalType};
use crate::text::{contains_phrase, word_line};
use crate::types::{ClusteredEvent, SourceType};
use crate::velocity::assess_spike;

const CRITICAL_TYPES: [SourceType; 3] = [SourceType::Wire, SourceType::Government, SourceType::Intelligence];

/// A topic whose activity spiked against its history (floor only on cold start).
pub fn velocity_spike(ctx: &DetectorContext<'_>) -> Vec<CorrelationSignal> {
    let cfg = &ctx.config.velocity;
    let mut out = Vec::new();
    for (topic, &current) in ctx.activity {
        let history = ctx
            .previous
            .topic_velocity_history
            .get(topic)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let Some(spike) = assess_spike(current, history, ctx.now, cfg) else {
            continue;
        };
        let (confidence, magnitude, description) = match (spike.multiplier, spike.baseline) {
            (Some(m), Some(b)) => (
                (0.5 + m / 15.0).min(0.95),
                m,
                format!("Activity {current:.1} is {m:.1}x the 7-day baseline of {b:.1}"),
            ),
            _ => (
                (0.5 + 0.1 * current / cfg.spike_floor).min(0.8),
                current,
                format!("Activity {current:.1} with no baseline yet (floor {:.1})", cfg.spike_floor),
            ),
        };
        ctx.emit(
            &mut out,
            Candidate {
                kind: SignalType::VelocitySpike,
                subject: topic.clone(),
                magnitude,
                title: format!("Velocity spike: {topic}"),
                description,
                confidence,
                data: SignalData::VelocitySpike {
                    topic: topic.clone(),
                    current,
                    baseline: spike.baseline,
                    multiplier: spike.multiplier,
                },
            },
        );
    }
    out
}

fn distinct_types<'e>(
    ctx: &DetectorContext<'_>,
    members: impl Iterator<Item = &'e crate::types::NewsItem>,
) -> BTreeSet<SourceType> {
    members.map(|m| ctx.source_type_of(m)).collect()
}

/// Several recent reports of one event from independent kinds of outlet.
pub fn convergence(ctx: &DetectorContext<'_>) -> Vec<CorrelationSignal> {
    let cfg = &ctx.config.signals;
    let cutoff = ctx.now - Duration::minutes(cfg.convergence_window_mins);
    let mut out = Vec::new();
    for ev in ctx.events {
        let recent: Vec<_> = ev
            .all_members
            .iter()
            .filter(|m| m.published_at >= cutoff)
            .collect();
        if recent.len() < cfg.convergence_min_members {
            continue;
        }
        let mut types = distinct_types(ctx, recent.iter().copied());
        types.remove(&SourceType::Other);
        if types.len() < cfg.convergence_min_types {
            continue;
        }
        let n = types.len();
        let names: Vec<&str> = types.iter().map(SourceType::as_str).collect();
        ctx.emit(
            &mut out,
            Candidate {
                kind: SignalType::Convergence,
                subject: ev.id.clone(),
                magnitude: n as f64,
                title: format!("Convergence: {}", ev.primary_title),
                description: format!(
                    "{} reports in {} min across {} source types ({})",
                    recent.len(),
                    cfg.convergence_window_mins,
                    n,
                    names.join(", ")
                ),
                confidence: (0.6 + 0.1 * (n as f64 - 2.0)).min(0.95),
                data: SignalData::Convergence {
                    event_id: ev.id.clone(),
                    source_types: types.into_iter().collect(),
                    recent_members: recent.len(),
                    threat: ev.threat.as_ref().map(|t| t.level),
                },
            },
        );
    }
    out
}

/// One event confirmed by wire, government and intelligence sources.
pub fn triangulation(ctx: &DetectorContext<'_>) -> Vec<CorrelationSignal> {
    let mut out = Vec::new();
    for ev in ctx.events {
        let types = distinct_types(ctx, ev.all_members.iter());
        if !CRITICAL_TYPES.iter().all(|t| types.contains(t)) {
            continue;
        }
        ctx.emit(
            &mut out,
            Candidate {
                kind: SignalType::Triangulation,
                subject: ev.id.clone(),
                magnitude: CRITICAL_TYPES.len() as f64,
                title: format!("Triangulated: {}", ev.primary_title),
                description: "Confirmed by wire, government and intelligence sources".to_string(),
                confidence: ctx.config.signals.triangulation_confidence,
                data: SignalData::Triangulation {
                    event_id: ev.id.clone(),
                    source_types: types.into_iter().collect(),
                    threat: ev.threat.as_ref().map(|t| t.level),
                },
            },
        );
    }
    out
}

/// Member titles of one event, as a single word line.
fn event_line(ev: &ClusteredEvent) -> String {
    let mut line = word_line(&ev.primary_title);
    for m in &ev.all_members {
        line.push(' ');
        line.push_str(&word_line(&m.title));
    }
    line
}

/// Terms from `keywords` present in `line`, normalized like the line.
pub(crate) fn matched_terms(line: &str, keywords: &[String]) -> Vec<String> {
    let mut hits: Vec<String> = keywords
        .iter()
        .map(|k| word_line(k))
        .filter(|k| contains_phrase(line, k))
        .collect();
    hits.dedup();
    hits
}

/// An event reporting a pipeline together with reduced flow.
pub fn flow_drop(ctx: &DetectorContext<'_>) -> Vec<CorrelationSignal> {
    let energy = &ctx.config.energy;
    let mut out = Vec::new();
    for ev in ctx.events {
        let line = event_line(ev);
        let pipeline_terms = matched_terms(&line, &energy.pipeline_keywords);
        if pipeline_terms.is_empty() {
            continue;
        }
        let flow_terms = matched_terms(&line, &energy.flow_drop_keywords);
        if flow_terms.is_empty() {
            continue;
        }
        ctx.emit(
            &mut out,
            Candidate {
                kind: SignalType::FlowDrop,
                subject: ev.id.clone(),
                magnitude: ev.member_count as f64,
                title: format!("Flow disruption: {}", ev.primary_title),
                description: format!(
                    "{} ({}) reported by {} source(s)",
                    pipeline_terms.join(", "),
                    flow_terms.join(", "),
                    ev.member_count
                ),
                confidence: (0.6 + 0.05 * ev.member_count as f64).min(0.9),
                data: SignalData::FlowDrop {
                    event_id: ev.id.clone(),
                    pipeline_terms,
                    flow_terms,
                    member_count: ev.member_count,
                },
            },
        );
    }
    out
}

/// True when any event this cycle would trip the flow-drop rule.
pub(crate) fn any_flow_drop(ctx: &DetectorContext<'_>) -> bool {
    let energy = &ctx.config.energy;
    ctx.events.iter().any(|ev| {
        let line = event_line(ev);
        !matched_terms(&line, &energy.pipeline_keywords).is_empty()
            && !matched_terms(&line, &energy.flow_drop_keywords).is_empty()
    })
}
