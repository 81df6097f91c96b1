//! Periodic correlation cycle:
//! gather → prepare → cluster → run cycle → persist snapshot → publish → notify.
//!
//! A failed gather skips the tick; the stored snapshot is left as it was, so
//! the process stays Warm.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::CorrelationEngine;
use crate::ingest::{prepare_batch, BatchSource};
use crate::notify::NotifierMux;
use crate::signals::CorrelationSignal;
use crate::snapshot::{SnapshotStore, StreamSnapshot};
use crate::types::ClusteredEvent;

pub const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 120;

/// Result of the most recent completed cycle, served over HTTP.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestCycle {
    pub completed_at: Option<DateTime<Utc>>,
    pub events: Vec<ClusteredEvent>,
    pub signals: Vec<CorrelationSignal>,
    pub snapshot: Option<StreamSnapshot>,
}

pub type SharedLatest = Arc<RwLock<LatestCycle>>;

pub fn shared_latest() -> SharedLatest {
    Arc::new(RwLock::new(LatestCycle::default()))
}

/// Everything a cycle needs, owned so it can move into a task.
pub struct CycleRunner {
    pub engine: CorrelationEngine,
    pub source: Arc<dyn BatchSource>,
    pub store: Arc<dyn SnapshotStore>,
    pub notifier: NotifierMux,
    pub latest: SharedLatest,
}

impl CycleRunner {
    /// One full cycle at `now`. Returns the number of signals emitted.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let raw = self
            .source
            .fetch_batch()
            .await
            .with_context(|| format!("gathering batch from {}", self.source.name()))?;
        let (batch, stats) = prepare_batch(raw);
        debug!(target: "scheduler", kept = stats.kept, deduped = stats.deduped, "batch ready");

        let previous = self.store.load().await;
        let (events, out) = self
            .engine
            .process_batch(&batch.news, &batch.predictions, &batch.markets, previous.as_ref(), now)
            .context("correlation cycle")?;

        if let Err(e) = self.store.save(&out.snapshot).await {
            warn!(target: "scheduler", error = %format!("{e:#}"), "snapshot not persisted");
        }

        let emitted = out.signals.len();
        {
            let mut latest = self.latest.write().unwrap_or_else(|p| p.into_inner());
            latest.completed_at = Some(now);
            latest.events = events;
            latest.signals = out.signals.clone();
            latest.snapshot = Some(out.snapshot);
        }

        if !out.signals.is_empty() {
            self.notifier.notify(&out.signals).await;
        }
        info!(
            target: "scheduler",
            cold = previous.is_none(),
            signals = emitted,
            "cycle finished"
        );
        Ok(emitted)
    }
}

/// `$CYCLE_INTERVAL_SECS` or the default.
pub fn interval_from_env() -> Duration {
    let secs = std::env::var("CYCLE_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(DEFAULT_CYCLE_INTERVAL_SECS);
    Duration::from_secs(secs)
}

/// Tick forever on `every`; the first tick fires immediately.
pub fn spawn_scheduler(runner: Arc<CycleRunner>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = runner.run_once(Utc::now()).await {
                warn!(target: "scheduler", "cycle skipped: {e:#}");
            }
        }
    })
}
