//! Binary payload codec
//!
//! - [`telemetry`]: 7-byte uplink frame, base64-framed
//! - [`downlink`]: 2-byte (or legacy 1-byte) feedback frame

pub mod downlink;
pub mod telemetry;

pub use downlink::{DownlinkFrame, DownlinkWidth};
pub use telemetry::{
    decode, Action, DecodedFrame, TelemetryFrame, TELEMETRY_FRAME_LEN, UNAVAILABLE_MARKER,
};
