// src/dedup.rs
//! Duplicate-signal suppression.
//!
//! Detectors ask the guard `is_recent_duplicate(key)` before emitting and call
//! `mark_signal_seen(key)` only when they do emit. Keys are deterministic in
//! (signal type, subject, rounded magnitude), so a metric oscillating around a
//! threshold alerts once per TTL instead of every cycle.
//!
//! Implementations must be internally synchronized; detectors may share one.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::trace;

use crate::config::DedupConfig;
use crate::signals::SignalType;

pub trait DedupGuard: Send + Sync {
    fn is_recent_duplicate(&self, key: &str) -> bool;
    fn mark_signal_seen(&self, key: &str);
}

/// `type:subject:magnitude`, subject lowercased, magnitude rounded to an integer.
pub fn dedupe_key(kind: SignalType, subject: &str, magnitude: f64) -> String {
    let mag = if magnitude.is_finite() { magnitude.round() as i64 } else { 0 };
    format!("{}:{}:{}", kind.as_str(), subject.trim().to_lowercase(), mag)
}

/// In-memory TTL store with per-signal-type TTL overrides.
#[derive(Debug)]
pub struct TtlDedupGuard {
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
    default_ttl: Duration,
    ttl_by_type: HashMap<String, Duration>,
    sweep_cap: usize,
}

impl TtlDedupGuard {
    pub fn new(cfg: &DedupConfig) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            default_ttl: Duration::seconds(cfg.default_ttl_secs.max(0)),
            ttl_by_type: cfg
                .ttl_by_type
                .iter()
                .map(|(k, v)| (k.clone(), Duration::seconds((*v).max(0))))
                .collect(),
            sweep_cap: cfg.sweep_cap.max(1),
        }
    }

    /// Single TTL for every type.
    pub fn with_ttl_secs(secs: i64) -> Self {
        Self::new(&DedupConfig {
            default_ttl_secs: secs,
            ttl_by_type: Default::default(),
            ..DedupConfig::default()
        })
    }

    fn ttl_for(&self, key: &str) -> Duration {
        key.split(':')
            .next()
            .and_then(|kind| self.ttl_by_type.get(kind))
            .copied()
            .unwrap_or(self.default_ttl)
    }

    pub fn is_recent_duplicate_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        let ttl = self.ttl_for(key);
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        match seen.get(key) {
            Some(&at) if now - at < ttl => true,
            Some(_) => {
                seen.remove(key);
                false
            }
            None => false,
        }
    }

    pub fn mark_seen_at(&self, key: &str, now: DateTime<Utc>) {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.insert(key.to_string(), now);
        if seen.len() > self.sweep_cap {
            let before = seen.len();
            seen.retain(|k, at| now - *at < self.ttl_for(k));
            trace!(target: "dedup", removed = before - seen.len(), "swept expired keys");
        }
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TtlDedupGuard {
    fn default() -> Self {
        Self::new(&DedupConfig::default())
    }
}

impl DedupGuard for TtlDedupGuard {
    fn is_recent_duplicate(&self, key: &str) -> bool {
        self.is_recent_duplicate_at(key, Utc::now())
    }

    fn mark_signal_seen(&self, key: &str) {
        self.mark_seen_at(key, Utc::now())
    }
}

/// Never suppresses. For replays and tests that want every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDedup;

impl DedupGuard for NoDedup {
    fn is_recent_duplicate(&self, _key: &str) -> bool {
        false
    }

    fn mark_signal_seen(&self, _key: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap()
    }

    #[test]
    fn key_rounds_magnitude_and_lowercases_subject() {
        assert_eq!(
            dedupe_key(SignalType::SilentDivergence, " AAPL ", 4.5),
            "silent_divergence:aapl:5"
        );
        assert_eq!(
            dedupe_key(SignalType::SilentDivergence, "AAPL", 4.6),
            dedupe_key(SignalType::SilentDivergence, "aapl", 5.4)
        );
        assert_eq!(dedupe_key(SignalType::FlowDrop, "x", f64::NAN), "flow_drop:x:0");
    }

    #[test]
    fn first_unseen_then_suppressed_until_ttl() {
        let g = TtlDedupGuard::with_ttl_secs(600);
        let k = "velocity_spike:oil:6";
        assert!(!g.is_recent_duplicate_at(k, t0()));
        g.mark_seen_at(k, t0());
        assert!(g.is_recent_duplicate_at(k, t0() + Duration::seconds(599)));
        assert!(!g.is_recent_duplicate_at(k, t0() + Duration::seconds(600)));
        // expired entry was dropped on read
        assert!(g.is_empty());
    }

    #[test]
    fn per_type_ttl_overrides_default() {
        let mut cfg = DedupConfig::default();
        cfg.default_ttl_secs = 60;
        cfg.ttl_by_type.insert("triangulation".into(), 3600);
        let g = TtlDedupGuard::new(&cfg);
        g.mark_seen_at("triangulation:ev-1:3", t0());
        g.mark_seen_at("convergence:ev-1:3", t0());
        let later = t0() + Duration::seconds(120);
        assert!(g.is_recent_duplicate_at("triangulation:ev-1:3", later));
        assert!(!g.is_recent_duplicate_at("convergence:ev-1:3", later));
    }

    #[test]
    fn sweep_bounds_map_size() {
        let mut cfg = DedupConfig::default();
        cfg.default_ttl_secs = 10;
        cfg.ttl_by_type.clear();
        cfg.sweep_cap = 2;
        let g = TtlDedupGuard::new(&cfg);
        g.mark_seen_at("a:x:1", t0());
        g.mark_seen_at("a:y:1", t0());
        g.mark_seen_at("a:z:1", t0() + Duration::seconds(30));
        assert_eq!(g.len(), 1);
    }
}
