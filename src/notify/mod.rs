// src/notify/mod.rs
//! Downstream delivery of emitted signals.

pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use tracing::{info, warn};

use crate::signals::CorrelationSignal;

pub use webhook::WebhookNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, signals: &[CorrelationSignal]) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Writes one `info!` line per signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, signals: &[CorrelationSignal]) -> Result<()> {
        for s in signals {
            info!(
                target: "notify",
                id = %s.id,
                kind = s.signal_type.as_str(),
                confidence = s.confidence,
                "signal"
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Fan-out to every configured notifier. Failures are logged, never raised.
#[derive(Clone, Default)]
pub struct NotifierMux {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(sinks: Vec<Arc<dyn Notifier>>) -> Self {
        Self { sinks }
    }

    /// Log sink always; webhook when `SIGNAL_WEBHOOK_URL` is set.
    pub fn from_env() -> Self {
        let mut sinks: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
        if let Some(url) = std::env::var("SIGNAL_WEBHOOK_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            sinks.push(Arc::new(WebhookNotifier::new(url)));
        }
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub async fn notify(&self, signals: &[CorrelationSignal]) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(signals).await {
                warn!(target: "notify", sink = sink.name(), "delivery failed: {e:#}");
                counter!("notify_failures_total", "sink" => sink.name()).increment(1);
            }
        }
    }
}
