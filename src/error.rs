//! Engine boundary errors.
//!
//! Data irregularities (missing coordinates, unknown sources) never surface here;
//! they degrade the feature that needs them. `InvalidInput` is reserved for a
//! caller handing the engine something it promised to filter first.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
