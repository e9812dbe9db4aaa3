use cdc_skid::{ProtocolViolation, SkidError};
use thiserror::Error;

pub type ScenarioResult<T> = Result<T, ScenarioError>;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Skid(#[from] SkidError),

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("failed to parse scenario: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("scenario did not settle within {ticks} ticks")]
    Timeout { ticks: u64 },

    #[error("crossing faulted: {0}")]
    Fault(ProtocolViolation),

    #[error("domain thread failed: {0}")]
    Thread(String),
}

impl ScenarioError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ScenarioError::InvalidScenario(msg.into())
    }
}
