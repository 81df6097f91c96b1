//! # Correlation Signals
//! Typed signals plus the rule evaluators that produce them.
//!
//! Every detector is a plain function over a [`DetectorContext`] returning a
//! fresh `Vec<CorrelationSignal>`. Detectors never touch shared state except
//! through the dedup guard, which is internally synchronized.
//!
//! News-side rules live in [`news`], market-side rules in [`markets`].

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::collaborators::{EntityContext, EntityLinker, SourceClassifier};
use crate::config::CorrelationConfig;
use crate::dedup::{dedupe_key, DedupGuard};
use crate::snapshot::StreamSnapshot;
use crate::types::{ClusteredEvent, MarketQuote, PredictionQuote, SourceType, ThreatLevel};
use crate::velocity::TopicActivity;

pub mod markets;
pub mod news;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    PredictionLeadsNews,
    VelocitySpike,
    ExplainedMarketMove,
    SilentDivergence,
    FlowPriceDivergence,
    Convergence,
    Triangulation,
    FlowDrop,
    NewsLeadsMarkets,
    // Reserved: part of the wire vocabulary, no rule emits them yet.
    HotspotEscalation,
    SectorCascade,
    MilitarySurge,
    GeoConvergence,
    KeywordSpike,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::PredictionLeadsNews => "prediction_leads_news",
            SignalType::VelocitySpike => "velocity_spike",
            SignalType::ExplainedMarketMove => "explained_market_move",
            SignalType::SilentDivergence => "silent_divergence",
            SignalType::FlowPriceDivergence => "flow_price_divergence",
            SignalType::Convergence => "convergence",
            SignalType::Triangulation => "triangulation",
            SignalType::FlowDrop => "flow_drop",
            SignalType::NewsLeadsMarkets => "news_leads_markets",
            SignalType::HotspotEscalation => "hotspot_escalation",
            SignalType::SectorCascade => "sector_cascade",
            SignalType::MilitarySurge => "military_surge",
            SignalType::GeoConvergence => "geo_convergence",
            SignalType::KeywordSpike => "keyword_spike",
        }
    }

    /// Types that no rule emits yet.
    pub fn is_reserved(&self) -> bool {
        matches!(
            self,
            SignalType::HotspotEscalation
                | SignalType::SectorCascade
                | SignalType::MilitarySurge
                | SignalType::GeoConvergence
                | SignalType::KeywordSpike
        )
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific payload; the `kind` tag mirrors the signal type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalData {
    #[serde(rename_all = "camelCase")]
    PredictionLeadsNews {
        market: String,
        previous_price: f64,
        current_price: f64,
        shift: f64,
        related_topics: Vec<String>,
        news_activity: f64,
    },
    #[serde(rename_all = "camelCase")]
    VelocitySpike {
        topic: String,
        current: f64,
        baseline: Option<f64>,
        multiplier: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    ExplainedMarketMove {
        symbol: String,
        market_change: f64,
        related_news: usize,
        headlines: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    SilentDivergence {
        symbol: String,
        market_change: f64,
        related_news: usize,
    },
    #[serde(rename_all = "camelCase")]
    FlowPriceDivergence { symbol: String, market_change: f64 },
    #[serde(rename_all = "camelCase")]
    Convergence {
        event_id: String,
        source_types: Vec<SourceType>,
        recent_members: usize,
        threat: Option<ThreatLevel>,
    },
    #[serde(rename_all = "camelCase")]
    Triangulation {
        event_id: String,
        source_types: Vec<SourceType>,
        threat: Option<ThreatLevel>,
    },
    #[serde(rename_all = "camelCase")]
    FlowDrop {
        event_id: String,
        pipeline_terms: Vec<String>,
        flow_terms: Vec<String>,
        member_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    NewsLeadsMarkets {
        topic: String,
        activity: f64,
        symbol: String,
        market_change: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationSignal {
    pub id: String,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub data: SignalData,
}

/// Everything a detector may read for one cycle.
pub struct DetectorContext<'a> {
    pub events: &'a [ClusteredEvent],
    pub predictions: &'a [PredictionQuote],
    pub markets: &'a [MarketQuote],
    pub previous: &'a StreamSnapshot,
    /// Current-cycle topic activity.
    pub activity: &'a TopicActivity,
    /// `None` when entity extraction failed this cycle.
    pub entities: Option<&'a [EntityContext]>,
    pub now: DateTime<Utc>,
    pub config: &'a CorrelationConfig,
    pub sources: &'a dyn SourceClassifier,
    pub entity_linker: &'a dyn EntityLinker,
    pub guard: &'a dyn DedupGuard,
}

/// A signal a rule wants to raise, before the dedup guard has a say.
pub(crate) struct Candidate {
    pub kind: SignalType,
    pub subject: String,
    pub magnitude: f64,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub data: SignalData,
}

impl DetectorContext<'_> {
    /// Guard protocol: a recently seen key suppresses without re-marking;
    /// otherwise mark then emit.
    pub(crate) fn emit(&self, out: &mut Vec<CorrelationSignal>, c: Candidate) {
        let key = dedupe_key(c.kind, &c.subject, c.magnitude);
        if self.guard.is_recent_duplicate(&key) {
            trace!(target: "dedup", key = %key, "suppressed duplicate signal");
            counter!("correlation_signals_suppressed_total", "type" => c.kind.as_str()).increment(1);
            return;
        }
        self.guard.mark_signal_seen(&key);
        debug!(
            target: "correlation",
            kind = c.kind.as_str(),
            subject = %c.subject,
            confidence = c.confidence,
            "signal raised"
        );
        out.push(CorrelationSignal {
            id: signal_id(&key, self.now),
            signal_type: c.kind,
            title: c.title,
            description: c.description,
            confidence: c.confidence.clamp(0.0, 1.0),
            timestamp: self.now,
            data: c.data,
        });
    }

    /// Source type from the item itself, else the classifier.
    pub(crate) fn source_type_of(&self, item: &crate::types::NewsItem) -> SourceType {
        item.source_type
            .unwrap_or_else(|| self.sources.source_type_of(&item.source))
    }
}

/// `sig-` + 12 hex chars of SHA-256 over the dedupe key and timestamp.
pub fn signal_id(key: &str, at: DateTime<Utc>) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write as _;
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(at.timestamp_millis().to_be_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    out.push_str("sig-");
    for b in digest.iter().take(6) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// One entry per rule, in evaluation order.
pub type Detector = fn(&DetectorContext<'_>) -> Vec<CorrelationSignal>;

pub const DETECTORS: &[(SignalType, Detector)] = &[
    (SignalType::PredictionLeadsNews, markets::prediction_leads_news),
    (SignalType::VelocitySpike, news::velocity_spike),
    (SignalType::ExplainedMarketMove, markets::explained_market_move),
    (SignalType::SilentDivergence, markets::silent_divergence),
    (SignalType::FlowPriceDivergence, markets::flow_price_divergence),
    (SignalType::Convergence, news::convergence),
    (SignalType::Triangulation, news::triangulation),
    (SignalType::FlowDrop, news::flow_drop),
    (SignalType::NewsLeadsMarkets, markets::news_leads_markets),
];

/// Run every detector in table order and concatenate.
pub fn run_detectors(ctx: &DetectorContext<'_>) -> Vec<CorrelationSignal> {
    let mut out = Vec::new();
    for (kind, detect) in DETECTORS {
        let found = detect(ctx);
        trace!(target: "correlation", kind = kind.as_str(), count = found.len(), "detector finished");
        out.extend(found);
    }
    out
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::TtlDedupGuard;
    use serde_json::json;

    #[test]
    fn signal_serializes_type_and_tagged_data() {
        let sig = CorrelationSignal {
            id: signal_id("silent_divergence:aapl:5", testkit::now()),
            signal_type: SignalType::SilentDivergence,
            title: "t".into(),
            description: "d".into(),
            confidence: 0.8,
            timestamp: testkit::now(),
            data: SignalData::SilentDivergence {
                symbol: "AAPL".into(),
                market_change: 4.5,
                related_news: 0,
            },
        };
        let v = serde_json::to_value(&sig).unwrap();
        assert_eq!(v["type"], json!("silent_divergence"));
        assert_eq!(v["data"]["kind"], json!("silent_divergence"));
        assert_eq!(v["data"]["marketChange"], json!(4.5));
        assert!(sig.id.starts_with("sig-") && sig.id.len() == 16);
    }

    #[test]
    fn reserved_types_have_no_detector() {
        for (kind, _) in DETECTORS {
            assert!(!kind.is_reserved(), "{kind} is wired but marked reserved");
        }
        assert!(SignalType::MilitarySurge.is_reserved());
        assert_eq!(SignalType::GeoConvergence.as_str(), "geo_convergence");
    }

    #[test]
    fn emit_respects_guard() {
        let fx = testkit::Fixture::new();
        let guard = TtlDedupGuard::with_ttl_secs(3600);
        let mut ctx = fx.ctx(&[], &[], &[]);
        ctx.guard = &guard;
        let cand = || Candidate {
            kind: SignalType::FlowPriceDivergence,
            subject: "CL=F".into(),
            magnitude: 2.4,
            title: "x".into(),
            description: "y".into(),
            confidence: 0.7,
            data: SignalData::FlowPriceDivergence {
                symbol: "CL=F".into(),
                market_change: 2.4,
            },
        };
        let mut out = Vec::new();
        ctx.emit(&mut out, cand());
        ctx.emit(&mut out, cand());
        assert_eq!(out.len(), 1);
        assert_eq!(guard.len(), 1);
    }
}
