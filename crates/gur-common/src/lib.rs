//! # Gur Common
//!
//! Shared types, errors, and the binary telemetry codec for the Gur Game
//! reporting-rate controller.
//!
//! ## Codec
//!
//! - [`TelemetryFrame`]: 7-byte node status frame (uplink)
//! - [`DownlinkFrame`]: satisfaction + overload feedback frame (downlink)
//! - [`DecodedFrame`]: decode result where "unavailable" is a first-class variant
//!
//! ## Types
//!
//! - [`NetworkServer`]: ChirpStack / TTN topic layout and JSON envelopes
//! - [`TrialRecord`]: one row of the durable trial log

pub mod codec;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use codec::{
    decode, Action, DecodedFrame, DownlinkFrame, DownlinkWidth, TelemetryFrame,
    TELEMETRY_FRAME_LEN, UNAVAILABLE_MARKER,
};
pub use error::{EnvelopeError, FrameError, GurError, Result, ScheduleError};
pub use types::{
    envelope::{Flavor, NetworkServer, OutboundMessage, Uplink},
    trial_record::{TrialRecord, TRIAL_LOG_COLUMNS, TRIAL_LOG_SCHEMA_VERSION},
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
