// src/ingest/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::types::{MarketQuote, NewsItem, PredictionQuote};

/// Everything gathered for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleBatch {
    #[serde(default)]
    pub news: Vec<NewsItem>,
    #[serde(default)]
    pub predictions: Vec<PredictionQuote>,
    #[serde(default)]
    pub markets: Vec<MarketQuote>,
}

#[async_trait::async_trait]
pub trait BatchSource: Send + Sync {
    async fn fetch_batch(&self) -> Result<CycleBatch>;
    fn name(&self) -> &'static str;
}
