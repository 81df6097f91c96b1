// tests/ingest_prepare.rs
//
// Batch preparation and a full runner cycle fed from a JSON batch file:
// - normalization, exact-title dedup, oldest-first ordering, filter counts
// - first run is Cold (no signals), second run is Warm and publishes

use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

use event_correlator::dedup::NoDedup;
use event_correlator::ingest::{prepare_batch, CycleBatch, JsonFileSource};
use event_correlator::notify::NotifierMux;
use event_correlator::scheduler::{shared_latest, CycleRunner};
use event_correlator::snapshot::{MemoryStore, SnapshotStore};
use event_correlator::{
    Collaborators, CorrelationConfig, CorrelationEngine, MarketQuote, NewsItem, PredictionQuote,
};

#[test]
fn prepare_dedups_sorts_and_filters() {
    let t0 = Utc.with_ymd_and_hms(2025, 9, 5, 7, 0, 0).unwrap();
    let batch = CycleBatch {
        news: vec![
            NewsItem::new(" Reuters ", "Oil prices jump after OPEC cut!", t0 + Duration::minutes(10)),
            NewsItem::new("AP", "oil prices jump after opec cut", t0 + Duration::minutes(12)),
            NewsItem::new("BBC", "<p>   </p>", t0),
            NewsItem::new("CNN", "Storm makes landfall in Florida", t0 + Duration::minutes(1)),
        ],
        predictions: vec![
            PredictionQuote::new("Will OPEC cut output again?", 41.0),
            PredictionQuote::new("Broken quote", f64::NAN),
        ],
        markets: vec![
            MarketQuote::new("CL=F", "Crude Oil").change(3.4),
            MarketQuote::new("  ", "Nameless").change(1.0),
            MarketQuote::new("NG=F", "Natural Gas").change(f64::INFINITY),
        ],
    };

    let (out, stats) = prepare_batch(batch);

    assert_eq!(stats.kept, 2);
    assert_eq!(stats.deduped, 1);
    // empty title + NaN prediction + blank symbol + infinite change
    assert_eq!(stats.filtered, 4);

    let titles: Vec<&str> = out.news.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, ["Storm makes landfall in Florida", "Oil prices jump after OPEC cut"]);
    assert_eq!(out.news[1].source, "Reuters");
    assert_eq!(out.predictions.len(), 1);
    assert_eq!(out.markets.len(), 1);
    assert_eq!(out.markets[0].symbol, "CL=F");
}

#[tokio::test]
async fn runner_goes_cold_then_warm() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batch.json");
    std::fs::write(
        &path,
        r#"{
            "news": [
                {"source": "Reuters", "title": "Central bank holds rates steady", "publishedAt": "2025-09-05T08:40:00Z"},
                {"source": "BBC", "title": "Central bank holds rates steady.", "publishedAt": "2025-09-05T08:45:00Z"}
            ],
            "markets": [
                {"symbol": "AAPL", "name": "Apple Inc.", "display": "AAPL", "changePercent": 4.5}
            ]
        }"#,
    )
    .unwrap();

    let cfg = CorrelationConfig::default();
    let collab = Collaborators::from_config(&cfg).with_guard(Arc::new(NoDedup));
    let store = Arc::new(MemoryStore::default());
    let latest = shared_latest();
    let runner = CycleRunner {
        engine: CorrelationEngine::new(cfg, collab),
        source: Arc::new(JsonFileSource::new(&path)),
        store: store.clone(),
        notifier: NotifierMux::new(vec![]),
        latest: latest.clone(),
    };

    let t1 = Utc.with_ymd_and_hms(2025, 9, 5, 9, 0, 0).unwrap();
    assert_eq!(runner.run_once(t1).await.unwrap(), 0);
    assert!(store.load().await.is_some());
    {
        let l = latest.read().unwrap();
        assert_eq!(l.completed_at, Some(t1));
        // the trailing-period duplicate was dropped before clustering
        assert_eq!(l.events.len(), 1);
        assert_eq!(l.events[0].member_count, 1);
    }

    let t2 = t1 + Duration::minutes(2);
    let emitted = runner.run_once(t2).await.unwrap();
    assert!(emitted >= 1);
    let l = latest.read().unwrap();
    assert_eq!(l.completed_at, Some(t2));
    assert_eq!(l.signals.len(), emitted);
    assert!(l.signals.iter().any(|s| s.signal_type.as_str() == "silent_divergence"));
    assert_eq!(l.snapshot.as_ref().map(|s| s.timestamp), Some(t2));
}

#[tokio::test]
async fn runner_fails_without_batch_and_keeps_snapshot() {
    let cfg = CorrelationConfig::default();
    let collab = Collaborators::from_config(&cfg).with_guard(Arc::new(NoDedup));
    let runner = CycleRunner {
        engine: CorrelationEngine::new(cfg, collab),
        source: Arc::new(JsonFileSource::new("/no/such/batch.json")),
        store: Arc::new(MemoryStore::default()),
        notifier: NotifierMux::new(vec![]),
        latest: shared_latest(),
    };
    let now = Utc.with_ymd_and_hms(2025, 9, 5, 9, 0, 0).unwrap();
    assert!(runner.run_once(now).await.is_err());
    assert!(runner.store.load().await.is_none());
    assert!(runner.latest.read().unwrap().completed_at.is_none());
}
