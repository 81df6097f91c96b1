//! Event Correlator: binary entrypoint
//! Loads config, starts the periodic correlation cycle and serves the latest
//! results over Axum.

use std::sync::Arc;

use event_correlator::{
    api::{self, AppState},
    ingest::JsonFileSource,
    metrics::Metrics,
    notify::NotifierMux,
    scheduler::{self, CycleRunner},
    snapshot::JsonFileStore,
    CorrelationConfig, CorrelationEngine,
};
use shuttle_axum::ShuttleAxum;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `RUST_LOG` filter (default `event_correlator=info,warn`); `LOG_FORMAT=json`
/// switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("event_correlator=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // Err only when a global subscriber is already installed; keep that one.
    let _ = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = CorrelationConfig::load()?;
    let metrics = match Metrics::init(&config) {
        Ok(m) => Some(m),
        Err(e) => {
            warn!("metrics disabled: {e:#}");
            None
        }
    };

    let engine = CorrelationEngine::from_config(config);
    let latest = scheduler::shared_latest();
    let runner = Arc::new(CycleRunner {
        engine,
        source: Arc::new(JsonFileSource::from_env()),
        store: Arc::new(JsonFileStore::from_env()),
        notifier: NotifierMux::from_env(),
        latest: latest.clone(),
    });
    let every = scheduler::interval_from_env();
    info!(interval_secs = every.as_secs(), "starting correlation scheduler");
    scheduler::spawn_scheduler(runner, every);

    let mut state = AppState::new(latest);
    if let Some(m) = metrics {
        state = state.with_metrics(m);
    }
    Ok(api::router(state).into())
}
