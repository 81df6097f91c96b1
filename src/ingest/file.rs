// src/ingest/file.rs
use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs;

use super::types::{BatchSource, CycleBatch};

pub const DEFAULT_BATCH_PATH: &str = "data/batch.json";

/// Reads a `CycleBatch` JSON document on every fetch.
/// Whatever drops the file there (a fetcher job, a test) owns its freshness.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$BATCH_PATH` or `data/batch.json`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("BATCH_PATH").unwrap_or_else(|_| DEFAULT_BATCH_PATH.to_string()))
    }
}

#[async_trait::async_trait]
impl BatchSource for JsonFileSource {
    async fn fetch_batch(&self) -> Result<CycleBatch> {
        let raw = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading batch {}", self.path.display()))?;
        let batch: CycleBatch = serde_json::from_str(&raw)
            .with_context(|| format!("parsing batch {}", self.path.display()))?;
        Ok(batch)
    }

    fn name(&self) -> &'static str {
        "json_file"
    }
}
