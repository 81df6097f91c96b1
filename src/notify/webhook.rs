use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::Notifier;
use crate::signals::CorrelationSignal;

/// POSTs `{"signals": [...]}` to a webhook with timeout and exponential backoff.
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
    backoff_base_ms: u64,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff_base_ms: 500,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_backoff_ms(mut self, base: u64) -> Self {
        self.backoff_base_ms = base;
        self
    }

    fn backoff(&self, attempt: u8) -> Duration {
        Duration::from_millis(self.backoff_base_ms << (attempt.saturating_sub(1)).min(6))
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    signals: &'a [CorrelationSignal],
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, signals: &[CorrelationSignal]) -> Result<()> {
        let payload = WebhookPayload { signals };
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(self.backoff(attempt)).await;
        }
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let n = WebhookNotifier::new("http://localhost:9").with_backoff_ms(100);
        assert_eq!(n.backoff(1), Duration::from_millis(100));
        assert_eq!(n.backoff(2), Duration::from_millis(200));
        assert_eq!(n.backoff(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn unreachable_endpoint_errors_after_retries() {
        let n = WebhookNotifier::new("http://127.0.0.1:9/hook")
            .with_retries(2)
            .with_backoff_ms(1)
            .with_timeout(1);
        assert!(n.send(&[]).await.is_err());
    }
}
