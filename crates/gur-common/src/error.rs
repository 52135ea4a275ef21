//! Error types for the Gur controller
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;

/// Result type alias using GurError
pub type Result<T> = std::result::Result<T, GurError>;

/// Unified error type for controller operations
#[derive(Debug, Error)]
pub enum GurError {
    // Telemetry frame errors
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    // Network-server envelope errors
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    // Setpoint schedule errors
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Telemetry frame decode errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Frame payload is empty")]
    Empty,

    #[error("Frame payload is not valid base64: {0}")]
    InvalidEncoding(String),

    #[error("Frame length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Uplink/downlink envelope errors
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Malformed JSON envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Envelope missing required field: {0}")]
    MissingField(&'static str),
}

/// Setpoint schedule errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Target schedule is empty")]
    Empty,

    #[error("Schedule offsets must be strictly increasing: {previous}s then {offset}s")]
    NonIncreasingOffset { previous: u64, offset: u64 },

    #[error("Schedule target at offset {offset}s must be positive")]
    ZeroTarget { offset: u64 },
}

impl From<std::io::Error> for GurError {
    fn from(err: std::io::Error) -> Self {
        GurError::Storage(err.to_string())
    }
}
