use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::metrics::Metrics;
use crate::scheduler::{LatestCycle, SharedLatest};
use crate::signals::{CorrelationSignal, SignalType};
use crate::types::ClusteredEvent;

#[derive(Clone)]
pub struct AppState {
    pub latest: SharedLatest,
    pub metrics: Option<Metrics>,
}

impl AppState {
    pub fn new(latest: SharedLatest) -> Self {
        Self { latest, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn read<T>(&self, f: impl FnOnce(&LatestCycle) -> T) -> T {
        let guard = self.latest.read().unwrap_or_else(|p| p.into_inner());
        f(&guard)
    }
}

pub fn router(state: AppState) -> Router {
    let metrics = state.metrics.as_ref().map(Metrics::router);
    let api = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/signals", get(signals))
        .route("/events", get(events))
        .route("/snapshot", get(snapshot))
        .with_state(state);
    let api = match metrics {
        Some(m) => api.merge(m),
        None => api,
    };
    api.layer(CorsLayer::very_permissive())
}

#[derive(Debug, Default, Deserialize)]
struct SignalsQuery {
    #[serde(rename = "type")]
    kind: Option<SignalType>,
    min_confidence: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignalsResp {
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    signals: Vec<CorrelationSignal>,
}

async fn signals(State(state): State<AppState>, Query(q): Query<SignalsQuery>) -> Json<SignalsResp> {
    Json(state.read(|l| SignalsResp {
        completed_at: l.completed_at,
        signals: l
            .signals
            .iter()
            .filter(|s| q.kind.map_or(true, |k| s.signal_type == k))
            .filter(|s| q.min_confidence.map_or(true, |c| s.confidence >= c))
            .cloned()
            .collect(),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventsResp {
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    total: usize,
    events: Vec<ClusteredEvent>,
}

async fn events(State(state): State<AppState>, Query(q): Query<EventsQuery>) -> Json<EventsResp> {
    Json(state.read(|l| EventsResp {
        completed_at: l.completed_at,
        total: l.events.len(),
        events: l.events.iter().take(q.limit.unwrap_or(usize::MAX)).cloned().collect(),
    }))
}

async fn snapshot(State(state): State<AppState>) -> impl IntoResponse {
    match state.read(|l| l.snapshot.clone()) {
        Some(s) => Json(s).into_response(),
        None => (StatusCode::NOT_FOUND, "no snapshot yet (cold)").into_response(),
    }
}
