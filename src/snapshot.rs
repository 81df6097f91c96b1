//! # Stream Snapshot
//! The engine's only carried-forward state: per-topic velocity, per-symbol
//! market change, per-market prediction price and the velocity history.
//!
//! The engine reads the previous snapshot and returns a new one; callers own
//! storage. [`JsonFileStore`] persists it as pretty JSON; a missing or corrupt
//! file reads as `None`, i.e. a Cold start.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::fs;
use tracing::{debug, warn};

use crate::config::PREDICTION_KEY_LEN;
use crate::types::{MarketQuote, PredictionQuote};
use crate::velocity::{TopicActivity, VelocityHistory};

pub const DEFAULT_SNAPSHOT_PATH: &str = "state/snapshot.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSnapshot {
    #[serde(default)]
    pub topic_velocity: BTreeMap<String, f64>,
    #[serde(default)]
    pub market_change: BTreeMap<String, f64>,
    #[serde(default)]
    pub prediction_value: BTreeMap<String, f64>,
    #[serde(default)]
    pub topic_velocity_history: VelocityHistory,
    pub timestamp: DateTime<Utc>,
}

impl StreamSnapshot {
    /// An empty snapshot taken at `now`.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            topic_velocity: BTreeMap::new(),
            market_change: BTreeMap::new(),
            prediction_value: BTreeMap::new(),
            topic_velocity_history: VelocityHistory::new(),
            timestamp: now,
        }
    }

    /// Capture end-of-cycle state. Quotes without a change value are skipped.
    pub fn capture(
        activity: &TopicActivity,
        markets: &[MarketQuote],
        predictions: &[PredictionQuote],
        history: VelocityHistory,
        now: DateTime<Utc>,
    ) -> Self {
        let market_change = markets
            .iter()
            .filter_map(|m| m.change_percent.map(|c| (m.symbol.clone(), c)))
            .collect();
        let prediction_value = predictions
            .iter()
            .map(|p| (prediction_key(&p.title), p.yes_price))
            .collect();
        Self {
            topic_velocity: activity.clone(),
            market_change,
            prediction_value,
            topic_velocity_history: history,
            timestamp: now,
        }
    }
}

/// Predictions are keyed by their title truncated to a fixed number of chars.
pub fn prediction_key(title: &str) -> String {
    title.trim().chars().take(PREDICTION_KEY_LEN).collect()
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self) -> Option<StreamSnapshot>;
    async fn save(&self, snapshot: &StreamSnapshot) -> Result<()>;
}

/// JSON file persistence.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$SNAPSHOT_PATH` or `state/snapshot.json`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("SNAPSHOT_PATH").unwrap_or_else(|_| DEFAULT_SNAPSHOT_PATH.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn load(&self) -> Option<StreamSnapshot> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) => {
                debug!(target: "snapshot", path = %self.path.display(), error = %e, "no snapshot on disk");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(target: "snapshot", path = %self.path.display(), error = %e, "corrupt snapshot ignored");
                None
            }
        }
    }

    async fn save(&self, snapshot: &StreamSnapshot) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating snapshot dir {}", dir.display()))?;
        }
        let body = serde_json::to_vec_pretty(snapshot).context("serialize snapshot")?;
        fs::write(&self.path, body)
            .await
            .with_context(|| format!("writing snapshot {}", self.path.display()))?;
        Ok(())
    }
}

/// Process-local store; a restart returns to Cold.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Option<StreamSnapshot>>,
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self) -> Option<StreamSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn save(&self, snapshot: &StreamSnapshot) -> Result<()> {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::velocity::VelocityPoint;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn capture_keys_and_skips() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let mut act = TopicActivity::new();
        act.insert("oil".into(), 4.0);
        let markets = vec![
            MarketQuote::new("CL=F", "Crude Oil").change(2.5),
            MarketQuote::new("GC=F", "Gold"),
        ];
        let long_title = "Will the Federal Reserve cut interest rates at the September 2025 meeting?";
        let preds = vec![PredictionQuote::new(long_title, 62.0)];
        let snap = StreamSnapshot::capture(&act, &markets, &preds, VelocityHistory::new(), now);

        assert_eq!(snap.market_change.len(), 1);
        assert_eq!(snap.market_change["CL=F"], 2.5);
        let key = prediction_key(long_title);
        assert_eq!(key.chars().count(), PREDICTION_KEY_LEN);
        assert_eq!(snap.prediction_value[&key], 62.0);
    }

    #[test]
    fn serialized_shape_is_camel_case() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let mut snap = StreamSnapshot::empty(now);
        snap.topic_velocity_history.insert(
            "oil".into(),
            vec![VelocityPoint {
                timestamp: now,
                velocity: 1.5,
            }],
        );
        let v = serde_json::to_value(&snap).unwrap();
        assert!(v.get("topicVelocity").is_some());
        assert!(v.get("marketChange").is_some());
        assert!(v.get("predictionValue").is_some());
        assert_eq!(v["topicVelocityHistory"]["oil"][0]["velocity"], json!(1.5));
        assert_eq!(v["timestamp"], json!("2025-06-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn memory_store_starts_cold() {
        let store = MemoryStore::default();
        assert!(store.load().await.is_none());
        let snap = StreamSnapshot::empty(Utc::now());
        store.save(&snap).await.unwrap();
        assert_eq!(store.load().await, Some(snap));
    }
}
