use cdc_ring::RingError;
use thiserror::Error;

pub type SkidResult<T> = Result<T, SkidError>;

#[derive(Debug, Error)]
pub enum SkidError {
    #[error("ring error: {0}")]
    Ring(#[from] RingError),

    #[error("invalid crossing configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("protocol violation: {0}")]
    Protocol(ProtocolViolation),
}

impl SkidError {
    pub fn config(msg: impl Into<String>) -> Self {
        SkidError::InvalidConfig(msg.into())
    }
}

/// Handshake rule broken by a neighbour of the crossing.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
pub enum ProtocolViolation {
    /// Upstream strobed a request while its group was closed.
    #[error("request strobed outside an active group")]
    StrobeOutsideGroup,

    /// Upstream altered a request it was told to hold.
    #[error("request changed while stalled")]
    RequestChangedWhileStalled,

    /// Downstream completed a request that was never forwarded.
    #[error("completion with no outstanding request")]
    UnexpectedCompletion,

    /// Downstream asserted more than one of ack/err/retry in one tick.
    #[error("more than one completion status asserted")]
    AmbiguousCompletion,
}
