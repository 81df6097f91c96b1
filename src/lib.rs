// src/lib.rs
// Public library surface for the service binary and integration tests.

pub mod error;
pub mod text;
pub mod types;

pub mod cluster;
pub mod collaborators;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod signals;
pub mod snapshot;
pub mod velocity;

// Service plumbing: intake, scheduling, delivery, HTTP
pub mod api;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod scheduler;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::CorrelationConfig;
pub use crate::engine::{Collaborators, CorrelationEngine, CycleOutput};
pub use crate::error::EngineError;
pub use crate::signals::{CorrelationSignal, SignalData, SignalType};
pub use crate::snapshot::StreamSnapshot;
pub use crate::types::{ClusteredEvent, MarketQuote, NewsItem, PredictionQuote};
