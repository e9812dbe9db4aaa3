//! Error handling helpers for the ring crate.
//!
//! The ring keeps its error surface small: geometry validation at
//! construction time. Runtime backpressure is reported through return values
//! (`Err(item)` hands the rejected value back) rather than errors.

use std::fmt;

/// Convenience result alias for fallible ring construction.
pub type RingResult<T, E = RingError> = Result<T, E>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Errors surfaced while building rings and synchronizers.
pub enum RingError {
    /// Requested slot count is outside the supported range.
    InvalidDepth { requested: u32, minimum: u32, maximum: u32 },
    /// Requested synchronizer length is outside the supported range.
    InvalidStages { requested: u32, minimum: u32, maximum: u32 },
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::InvalidDepth {
                requested,
                minimum,
                maximum,
            } => {
                write!(
                    f,
                    "ring depth {requested} must be between {minimum} and {maximum} slots"
                )
            }
            RingError::InvalidStages {
                requested,
                minimum,
                maximum,
            } => {
                write!(
                    f,
                    "synchronizer length {requested} must be between {minimum} and {maximum} stages"
                )
            }
        }
    }
}

impl std::error::Error for RingError {}
