// tests/cycle_scenarios.rs
//
// End-to-end correlation cycles through the public engine API:
// cold start, snapshot threading, the velocity/triangulation/divergence
// scenarios, the confidence floor, dedup suppression and collaborator failure.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;

use event_correlator::collaborators::{EntityContext, EntityLinker, NewsReference};
use event_correlator::dedup::{NoDedup, TtlDedupGuard};
use event_correlator::types::SourceType;
use event_correlator::velocity::VelocityPoint;
use event_correlator::{
    ClusteredEvent, Collaborators, CorrelationConfig, CorrelationEngine, CorrelationSignal,
    MarketQuote, NewsItem, PredictionQuote, SignalData, SignalType, StreamSnapshot,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 3, 15, 0, 0).unwrap()
}

fn engine_with(cfg: CorrelationConfig) -> CorrelationEngine {
    let collab = Collaborators::from_config(&cfg).with_guard(Arc::new(NoDedup));
    CorrelationEngine::new(cfg, collab)
}

fn engine() -> CorrelationEngine {
    engine_with(CorrelationConfig::default())
}

fn warm() -> StreamSnapshot {
    StreamSnapshot::empty(now() - Duration::minutes(2))
}

fn of_type(signals: &[CorrelationSignal], kind: SignalType) -> Vec<&CorrelationSignal> {
    signals.iter().filter(|s| s.signal_type == kind).collect()
}

fn busy_news() -> Vec<NewsItem> {
    let mut news: Vec<NewsItem> = ["Reuters", "AP", "BBC", "CNN", "Bloomberg", "Guardian"]
        .iter()
        .enumerate()
        .map(|(i, s)| NewsItem::new(*s, "New tariffs announced on steel imports", now() - Duration::minutes(5 * i as i64)))
        .collect();
    news.push(NewsItem::new("Reuters", "Nord Stream pipeline flows halted", now() - Duration::minutes(3)));
    news.push(NewsItem::new("Pentagon", "Drone strike reported near border post", now() - Duration::minutes(9)));
    news.push(NewsItem::new("ISW", "Drone strike reported near border post", now() - Duration::minutes(8)));
    news.push(NewsItem::new("AFP", "Drone strike reported near border post", now() - Duration::minutes(7)));
    news.sort_by_key(|n| n.published_at);
    news
}

fn busy_markets() -> Vec<MarketQuote> {
    vec![
        MarketQuote::new("AAPL", "Apple Inc.").change(4.5),
        MarketQuote::new("NG=F", "Natural Gas").change(2.8),
        MarketQuote::new("LMT", "Lockheed Martin").change(-3.3),
    ]
}

#[test]
fn cold_start_emits_nothing_but_snapshots() {
    let e = engine();
    let preds = [PredictionQuote::new("Will tariffs on steel rise by 2026?", 55.0)];
    let (events, out) = e
        .process_batch(&busy_news(), &preds, &busy_markets(), None, now())
        .unwrap();
    assert!(!events.is_empty());
    assert!(out.signals.is_empty());
    assert_eq!(out.snapshot.timestamp, now());
    assert!(out.snapshot.topic_velocity.contains_key("tariffs"));
    assert_eq!(out.snapshot.market_change.len(), 3);
    assert_eq!(out.snapshot.prediction_value.len(), 1);
    assert_eq!(out.snapshot.topic_velocity_history["tariffs"].len(), 1);
}

#[test]
fn snapshot_threads_between_cycles() {
    let e = engine();
    let news = busy_news();
    let (_, first) = e.process_batch(&news, &[], &busy_markets(), None, now()).unwrap();
    let later = now() + Duration::minutes(2);
    let (_, second) = e
        .process_batch(&news, &[], &busy_markets(), Some(&first.snapshot), later)
        .unwrap();
    assert!(!second.signals.is_empty());
    assert_eq!(second.snapshot.topic_velocity_history["tariffs"].len(), 2);
    assert_eq!(second.snapshot.timestamp, later);
}

#[test]
fn velocity_spike_scenario() {
    let e = engine();
    let news: Vec<NewsItem> = ["Reuters", "AP", "BBC", "CNN", "Bloomberg", "Guardian"]
        .iter()
        .enumerate()
        .map(|(i, s)| NewsItem::new(*s, "New tariffs announced on steel imports", now() - Duration::minutes(10 * i as i64)))
        .collect();

    let mut prev = warm();
    prev.topic_velocity_history.insert(
        "tariffs".into(),
        (0..7)
            .map(|d| VelocityPoint {
                timestamp: now() - Duration::days(d) - Duration::hours(1),
                velocity: 2.0,
            })
            .collect(),
    );

    let (_, out) = e.process_batch(&news, &[], &[], Some(&prev), now()).unwrap();
    assert!((out.snapshot.topic_velocity["tariffs"] - 12.0).abs() < 1e-9);

    let spikes = of_type(&out.signals, SignalType::VelocitySpike);
    assert_eq!(spikes.len(), 1);
    match &spikes[0].data {
        SignalData::VelocitySpike { topic, multiplier, baseline, .. } => {
            assert_eq!(topic, "tariffs");
            assert!((multiplier.unwrap() - 6.0).abs() < 1e-9);
            assert!((baseline.unwrap() - 2.0).abs() < 1e-9);
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn triangulation_scenario() {
    let e = engine();
    let news = vec![
        NewsItem::new("Reuters", "Explosion at army depot", now() - Duration::minutes(30)).source_type(SourceType::Wire),
        NewsItem::new("State Department", "Explosion at army depot", now() - Duration::minutes(20))
            .source_type(SourceType::Government),
        NewsItem::new("Bellingcat", "Explosion at army depot", now() - Duration::minutes(10))
            .source_type(SourceType::Intelligence),
    ];
    let (events, out) = e.process_batch(&news, &[], &[], Some(&warm()), now()).unwrap();
    assert_eq!(events.len(), 1);
    let tri = of_type(&out.signals, SignalType::Triangulation);
    assert_eq!(tri.len(), 1);
    assert_eq!(tri[0].confidence, 0.9);
}

#[test]
fn silent_divergence_scenario() {
    let e = engine();
    let markets = [MarketQuote::new("AAPL", "Apple Inc.").change(4.5)];
    let out = e.run_cycle(&[], &[], &markets, Some(&warm()), now()).unwrap();
    let silent = of_type(&out.signals, SignalType::SilentDivergence);
    assert_eq!(silent.len(), 1);
    let v = serde_json::to_value(silent[0]).unwrap();
    assert_eq!(v["data"]["marketChange"], json!(4.5));
    assert_eq!(v["type"], json!("silent_divergence"));
}

#[test]
fn entity_linked_news_explains_instead_of_silent() {
    let e = engine();
    let news = vec![NewsItem::new("Reuters", "Apple warns on iPhone demand", now() - Duration::minutes(15))];
    let markets = [MarketQuote::new("AAPL", "Apple Inc.").change(-4.5)];
    let (_, out) = e.process_batch(&news, &[], &markets, Some(&warm()), now()).unwrap();
    assert_eq!(of_type(&out.signals, SignalType::ExplainedMarketMove).len(), 1);
    assert!(of_type(&out.signals, SignalType::SilentDivergence).is_empty());
}

#[test]
fn final_output_respects_confidence_floor_and_one_per_type() {
    let e = engine();
    let mut prev = warm();
    prev.prediction_value.insert("Will tariffs on steel rise by 2026?".into(), 40.0);
    let preds = [PredictionQuote::new("Will tariffs on steel rise by 2026?", 47.0)];
    let (_, out) = e
        .process_batch(&busy_news(), &preds, &busy_markets(), Some(&prev), now())
        .unwrap();
    assert!(!out.signals.is_empty());
    for s in &out.signals {
        assert!(s.confidence >= 0.6, "{} below floor: {}", s.signal_type, s.confidence);
        assert_eq!(of_type(&out.signals, s.signal_type).len(), 1);
    }

    // Raising the floor only removes signals.
    let mut strict = CorrelationConfig::default();
    strict.signals.min_confidence = 0.85;
    let (_, hi) = engine_with(strict)
        .process_batch(&busy_news(), &preds, &busy_markets(), Some(&prev), now())
        .unwrap();
    assert!(hi.signals.len() <= out.signals.len());
    assert!(hi.signals.iter().all(|s| s.confidence >= 0.85));
}

#[test]
fn guard_suppresses_repeat_on_next_cycle() {
    let cfg = CorrelationConfig::default();
    let guard = Arc::new(TtlDedupGuard::new(&cfg.dedup));
    let collab = Collaborators::from_config(&cfg).with_guard(guard.clone());
    let e = CorrelationEngine::new(cfg, collab);
    let markets = [MarketQuote::new("AAPL", "Apple Inc.").change(4.5)];

    let first = e.run_cycle(&[], &[], &markets, Some(&warm()), now()).unwrap();
    assert_eq!(of_type(&first.signals, SignalType::SilentDivergence).len(), 1);

    let second = e
        .run_cycle(&[], &[], &markets, Some(&first.snapshot), now() + Duration::minutes(2))
        .unwrap();
    assert!(of_type(&second.signals, SignalType::SilentDivergence).is_empty());

    // A different rounded magnitude is a new key.
    let bigger = [MarketQuote::new("AAPL", "Apple Inc.").change(7.2)];
    let third = e
        .run_cycle(&[], &[], &bigger, Some(&second.snapshot), now() + Duration::minutes(4))
        .unwrap();
    assert_eq!(of_type(&third.signals, SignalType::SilentDivergence).len(), 1);
    assert_eq!(guard.len(), 2);
}

struct DownLinker;

impl EntityLinker for DownLinker {
    fn extract_entities_from_clusters(&self, _events: &[ClusteredEvent]) -> anyhow::Result<Vec<EntityContext>> {
        anyhow::bail!("entity service unavailable")
    }
    fn find_news_for_symbol(&self, _symbol: &str, _contexts: &[EntityContext]) -> anyhow::Result<Vec<NewsReference>> {
        anyhow::bail!("entity service unavailable")
    }
}

#[test]
fn failing_entity_linker_only_degrades_market_rules() {
    let cfg = CorrelationConfig::default();
    let collab = Collaborators::from_config(&cfg)
        .with_guard(Arc::new(NoDedup))
        .with_entities(Arc::new(DownLinker));
    let e = CorrelationEngine::new(cfg, collab);
    let (_, out) = e
        .process_batch(&busy_news(), &[], &busy_markets(), Some(&warm()), now())
        .unwrap();
    assert!(of_type(&out.signals, SignalType::SilentDivergence).is_empty());
    assert!(of_type(&out.signals, SignalType::ExplainedMarketMove).is_empty());
    assert_eq!(of_type(&out.signals, SignalType::Triangulation).len(), 1);
    assert_eq!(of_type(&out.signals, SignalType::FlowDrop).len(), 1);
}
