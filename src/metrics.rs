use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::config::CorrelationConfig;

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder, describe engine series and
    /// publish the active thresholds as static gauges.
    pub fn init(cfg: &CorrelationConfig) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe_engine_metrics();

        gauge!("correlation_min_confidence").set(cfg.signals.min_confidence);
        gauge!("correlation_similarity_threshold").set(cfg.clustering.similarity_threshold);
        gauge!("correlation_spike_multiplier").set(cfg.velocity.spike_multiplier);
        Ok(Self { handle })
    }

    /// `GET /metrics` in Prometheus text format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route("/metrics", get(move || std::future::ready(handle.render())))
    }
}

/// Register help text once per process.
pub fn describe_engine_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("correlation_cycles_total", "Correlation cycles run.");
        describe_counter!("correlation_signals_emitted_total", "Signals in final cycle output, by type.");
        describe_counter!(
            "correlation_signals_suppressed_total",
            "Signals suppressed by the dedup guard, by type."
        );
        describe_counter!(
            "correlation_collaborator_errors_total",
            "Entity/threat collaborator failures, by collaborator."
        );
        describe_gauge!("cluster_items_last_cycle", "News items clustered in the last cycle.");
        describe_gauge!("cluster_events_last_cycle", "Events produced in the last cycle.");
        describe_histogram!("correlation_cycle_ms", "Cycle wall time in milliseconds.");
        describe_gauge!("correlation_min_confidence", "Confidence floor applied to cycle output.");
        describe_gauge!("correlation_similarity_threshold", "Jaccard cutoff used by clustering.");
        describe_gauge!("correlation_spike_multiplier", "Baseline multiplier for velocity spikes.");
    });
}
