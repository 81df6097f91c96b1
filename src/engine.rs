//! # Correlation Engine
//! One cycle: validate → topic activity → next history/snapshot → (if warm)
//! detectors → one signal per type → confidence floor.
//!
//! The engine keeps no state between calls. The previous snapshot comes in,
//! the next one goes out, and the caller stores it. Without a previous
//! snapshot the cycle is Cold and returns no signals.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cluster::{annotate_threats, cluster_news};
use crate::collaborators::{
    EntityLinker, KeywordEntityLinker, KeywordThreatClassifier, SourceClassifier, SourceTable,
    ThreatClassifier,
};
use crate::config::CorrelationConfig;
use crate::dedup::{DedupGuard, TtlDedupGuard};
use crate::error::EngineError;
use crate::signals::{run_detectors, CorrelationSignal, DetectorContext};
use crate::snapshot::StreamSnapshot;
use crate::types::{ClusteredEvent, MarketQuote, NewsItem, PredictionQuote};
use crate::velocity::{extract_topic_activity, update_history, VelocityHistory};

/// The black boxes a cycle calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub sources: Arc<dyn SourceClassifier>,
    pub entities: Arc<dyn EntityLinker>,
    pub threats: Arc<dyn ThreatClassifier>,
    pub guard: Arc<dyn DedupGuard>,
}

impl Collaborators {
    /// Table/keyword implementations plus an in-memory TTL guard.
    pub fn from_config(cfg: &CorrelationConfig) -> Self {
        Self {
            sources: Arc::new(SourceTable::from_config(&cfg.sources)),
            entities: Arc::new(KeywordEntityLinker::from_config(&cfg.entities)),
            threats: Arc::new(KeywordThreatClassifier::from_config(&cfg.threats)),
            guard: Arc::new(TtlDedupGuard::new(&cfg.dedup)),
        }
    }

    pub fn with_guard(mut self, guard: Arc<dyn DedupGuard>) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_entities(mut self, entities: Arc<dyn EntityLinker>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_threats(mut self, threats: Arc<dyn ThreatClassifier>) -> Self {
        self.threats = threats;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleOutput {
    pub signals: Vec<CorrelationSignal>,
    pub snapshot: StreamSnapshot,
}

#[derive(Clone)]
pub struct CorrelationEngine {
    config: Arc<CorrelationConfig>,
    collaborators: Collaborators,
}

impl CorrelationEngine {
    pub fn new(config: CorrelationConfig, collaborators: Collaborators) -> Self {
        Self {
            config: Arc::new(config),
            collaborators,
        }
    }

    pub fn from_config(config: CorrelationConfig) -> Self {
        let collaborators = Collaborators::from_config(&config);
        Self::new(config, collaborators)
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Cluster a prepared batch and attach threat levels.
    pub fn cluster(&self, news: &[NewsItem]) -> Vec<ClusteredEvent> {
        let sources = &self.collaborators.sources;
        let events = cluster_news(news, |s| sources.tier_of(s), &self.config.clustering);
        gauge!("cluster_items_last_cycle").set(news.len() as f64);
        gauge!("cluster_events_last_cycle").set(events.len() as f64);
        annotate_threats(events, self.collaborators.threats.as_ref())
    }

    /// Run one correlation cycle over already clustered events.
    pub fn run_cycle(
        &self,
        events: &[ClusteredEvent],
        predictions: &[PredictionQuote],
        markets: &[MarketQuote],
        previous: Option<&StreamSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<CycleOutput, EngineError> {
        validate_events(events)?;
        validate_quotes(predictions, markets)?;
        let started = Instant::now();
        counter!("correlation_cycles_total").increment(1);

        let cfg = &*self.config;
        let activity = extract_topic_activity(events, &cfg.topics);
        let empty = VelocityHistory::new();
        let prev_history = previous.map_or(&empty, |p| &p.topic_velocity_history);
        let history = update_history(prev_history, &activity, now, &cfg.velocity);
        let snapshot = StreamSnapshot::capture(&activity, markets, predictions, history, now);

        let Some(previous) = previous else {
            info!(target: "correlation", topics = activity.len(), "cold start: snapshot only");
            histogram!("correlation_cycle_ms").record(started.elapsed().as_secs_f64() * 1000.0);
            return Ok(CycleOutput {
                signals: Vec::new(),
                snapshot,
            });
        };

        let entities = match self.collaborators.entities.extract_entities_from_clusters(events) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(target: "correlation", error = ?e, "entity extraction failed, market rules skipped");
                counter!("correlation_collaborator_errors_total", "collaborator" => "entity").increment(1);
                None
            }
        };

        let ctx = DetectorContext {
            events,
            predictions,
            markets,
            previous,
            activity: &activity,
            entities: entities.as_deref(),
            now,
            config: cfg,
            sources: self.collaborators.sources.as_ref(),
            entity_linker: self.collaborators.entities.as_ref(),
            guard: self.collaborators.guard.as_ref(),
        };
        let raw = run_detectors(&ctx);
        let raw_count = raw.len();
        let signals = finalize(raw, cfg.signals.min_confidence);

        for s in &signals {
            counter!("correlation_signals_emitted_total", "type" => s.signal_type.as_str()).increment(1);
        }
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!("correlation_cycle_ms").record(elapsed_ms);
        info!(
            target: "correlation",
            events = events.len(),
            raw = raw_count,
            emitted = signals.len(),
            elapsed_ms,
            "cycle complete"
        );
        Ok(CycleOutput { signals, snapshot })
    }

    /// Cluster + annotate + run cycle. Returns the events alongside the output.
    pub fn process_batch(
        &self,
        news: &[NewsItem],
        predictions: &[PredictionQuote],
        markets: &[MarketQuote],
        previous: Option<&StreamSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<(Vec<ClusteredEvent>, CycleOutput), EngineError> {
        if let Some(bad) = news.iter().position(|n| n.title.trim().is_empty()) {
            return Err(EngineError::invalid(format!("news item {bad} has an empty title")));
        }
        let events = self.cluster(news);
        let out = self.run_cycle(&events, predictions, markets, previous, now)?;
        Ok((events, out))
    }
}

/// First signal per type, then the confidence floor.
///
/// Detectors have already marked every candidate in the dedup guard, so a
/// signal cut here stays suppressed for its TTL and is not delivered on a
/// later cycle.
fn finalize(raw: Vec<CorrelationSignal>, min_confidence: f64) -> Vec<CorrelationSignal> {
    let mut seen = BTreeSet::new();
    raw.into_iter()
        .filter(|s| seen.insert(s.signal_type))
        .filter(|s| {
            let keep = s.confidence >= min_confidence;
            if !keep {
                debug!(target: "correlation", kind = s.signal_type.as_str(), confidence = s.confidence, "below confidence floor");
            }
            keep
        })
        .collect()
}

fn validate_events(events: &[ClusteredEvent]) -> Result<(), EngineError> {
    for ev in events {
        if ev.primary_title.trim().is_empty() {
            return Err(EngineError::invalid(format!("event {} has an empty title", ev.id)));
        }
    }
    Ok(())
}

fn validate_quotes(predictions: &[PredictionQuote], markets: &[MarketQuote]) -> Result<(), EngineError> {
    for p in predictions {
        if !p.yes_price.is_finite() || p.volume.is_some_and(|v| !v.is_finite()) {
            return Err(EngineError::invalid(format!("prediction '{}' has a non-finite value", p.title)));
        }
    }
    for m in markets {
        let bad = |x: Option<f64>| x.is_some_and(|v| !v.is_finite());
        if bad(m.price) || bad(m.change_percent) {
            return Err(EngineError::invalid(format!("market {} has a non-finite value", m.symbol)));
        }
    }
    Ok(())
}
