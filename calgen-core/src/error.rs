//! Error types for calgen-core.

use thiserror::Error;

/// Result type alias for calgen operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for calgen operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A channel component is outside its valid range.
    #[error("invalid {component} index {value} (must be < {limit})")]
    InvalidChannel {
        component: &'static str,
        value: usize,
        limit: usize,
    },

    /// Test plan or run configuration is inconsistent.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Observed event count deviates from the test plan by more than 10%.
    #[error("event count mismatch: expected {expected} events, found {observed}")]
    EventCountMismatch { expected: usize, observed: usize },

    /// Event source failure.
    #[error("event source error: {0}")]
    Source(#[from] SourceError),

    /// Curve smoothing failure.
    #[error("smoothing error: {0}")]
    Smoothing(#[from] SmoothingError),
}

/// Failures reported by an event source for a single ordinal.
///
/// These are recoverable: the run logs them and moves on to the next event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// No decodable record exists at this ordinal.
    #[error("no event record at ordinal {0}")]
    Missing(usize),

    /// A record exists but could not be decoded.
    #[error("malformed event record at ordinal {ordinal}: {reason}")]
    Malformed { ordinal: usize, reason: String },

    /// Ordinal is past the end of the source.
    #[error("event ordinal {ordinal} out of range ({count} events)")]
    OutOfRange { ordinal: usize, count: usize },
}

/// Errors raised while smoothing a single channel's curve.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SmoothingError {
    /// The raw curve is too short for the configured parameters.
    #[error("curve has {available} usable points, at least {required} required")]
    TooFewPoints { available: usize, required: usize },

    /// Smoothing parameters are self-inconsistent.
    #[error("invalid smoothing parameters: {0}")]
    InvalidParams(String),
}
