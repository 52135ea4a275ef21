//! Uplink telemetry frame (node -> controller)
//!
//! Fixed 7-octet little-endian layout:
//!
//! ```text
//! 0        1      2                 3                   4       5..7
//! node_id  state  last_satisfaction reward_probability  action  period_seconds (u16 LE)
//! ```

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Exact decoded length of a telemetry frame
pub const TELEMETRY_FRAME_LEN: usize = 7;

/// Marker written wherever a field of an unavailable frame would go
pub const UNAVAILABLE_MARKER: &str = "ERROR";

/// Automaton action reported by a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Punish,
    Reward,
    /// Any byte other than 0/1; kept so the rest of the frame is not lost
    Unknown(u8),
}

impl From<u8> for Action {
    fn from(value: u8) -> Self {
        match value {
            0 => Action::Punish,
            1 => Action::Reward,
            other => Action::Unknown(other),
        }
    }
}

impl From<Action> for u8 {
    fn from(action: Action) -> Self {
        match action {
            Action::Punish => 0,
            Action::Reward => 1,
            Action::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Punish => write!(f, "PUNISH"),
            Action::Reward => write!(f, "REWARD"),
            Action::Unknown(raw) => write!(f, "UNKNOWN({raw})"),
        }
    }
}

/// Decoded node telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub node_id: u8,
    pub state: u8,
    pub last_satisfaction: u8,
    /// Fixed-point probability, value / 100
    pub reward_probability_pct: u8,
    pub action: Action,
    pub period_seconds: u16,
}

impl TelemetryFrame {
    /// Reward probability in [0, 1] (values above 100 are reported as-is)
    pub fn reward_probability(&self) -> f64 {
        f64::from(self.reward_probability_pct) / 100.0
    }

    /// Parse a raw 7-byte frame
    pub fn from_bytes(raw: &[u8]) -> Result<Self, FrameError> {
        if raw.len() != TELEMETRY_FRAME_LEN {
            return Err(FrameError::LengthMismatch {
                expected: TELEMETRY_FRAME_LEN,
                actual: raw.len(),
            });
        }

        let mut buf = raw;
        Ok(Self {
            node_id: buf.get_u8(),
            state: buf.get_u8(),
            last_satisfaction: buf.get_u8(),
            reward_probability_pct: buf.get_u8(),
            action: Action::from(buf.get_u8()),
            period_seconds: buf.get_u16_le(),
        })
    }

    /// Serialize to the raw 7-byte layout
    pub fn to_bytes(&self) -> [u8; TELEMETRY_FRAME_LEN] {
        let mut buf = BytesMut::with_capacity(TELEMETRY_FRAME_LEN);
        buf.put_u8(self.node_id);
        buf.put_u8(self.state);
        buf.put_u8(self.last_satisfaction);
        buf.put_u8(self.reward_probability_pct);
        buf.put_u8(self.action.into());
        buf.put_u16_le(self.period_seconds);

        let mut out = [0u8; TELEMETRY_FRAME_LEN];
        out.copy_from_slice(&buf);
        out
    }

    /// Base64 text as carried in the uplink envelope
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }
}

/// Result of decoding an uplink payload
///
/// An unavailable frame is never conflated with a valid all-zero frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    Available(TelemetryFrame),
    Unavailable(FrameError),
}

impl DecodedFrame {
    pub fn frame(&self) -> Option<&TelemetryFrame> {
        match self {
            DecodedFrame::Available(frame) => Some(frame),
            DecodedFrame::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, DecodedFrame::Available(_))
    }
}

/// Decode the base64 text of an uplink payload. Never fails: errors become
/// [`DecodedFrame::Unavailable`].
pub fn decode(encoded: impl AsRef<[u8]>) -> DecodedFrame {
    let encoded = encoded.as_ref();
    if encoded.is_empty() {
        return DecodedFrame::Unavailable(FrameError::Empty);
    }

    let raw = match STANDARD.decode(encoded) {
        Ok(raw) => raw,
        Err(e) => return DecodedFrame::Unavailable(FrameError::InvalidEncoding(e.to_string())),
    };

    match TelemetryFrame::from_bytes(&raw) {
        Ok(frame) => DecodedFrame::Available(frame),
        Err(e) => DecodedFrame::Unavailable(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reference_frame() {
        let encoded = STANDARD.encode([5u8, 2, 80, 60, 1, 0x2C, 0x01]);
        let frame = *decode(encoded).frame().unwrap();

        assert_eq!(frame.node_id, 5);
        assert_eq!(frame.state, 2);
        assert_eq!(frame.last_satisfaction, 80);
        assert!((frame.reward_probability() - 0.60).abs() < 1e-9);
        assert_eq!(frame.action, Action::Reward);
        assert_eq!(frame.period_seconds, 300);
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(decode(""), DecodedFrame::Unavailable(FrameError::Empty));
    }

    #[test]
    fn test_decode_invalid_base64() {
        let decoded = decode("@@not-base64@@");
        assert!(matches!(
            decoded,
            DecodedFrame::Unavailable(FrameError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn test_decode_wrong_length() {
        // 1-byte legacy payloads and 8-byte payloads are both rejected
        for raw in [vec![0x55u8], vec![0u8; 8]] {
            let decoded = decode(STANDARD.encode(&raw));
            assert_eq!(
                decoded,
                DecodedFrame::Unavailable(FrameError::LengthMismatch {
                    expected: TELEMETRY_FRAME_LEN,
                    actual: raw.len(),
                })
            );
        }
    }

    #[test]
    fn test_all_zero_frame_is_available() {
        let decoded = decode(STANDARD.encode([0u8; 7]));
        assert!(decoded.is_available());
        assert_eq!(decoded.frame().unwrap().action, Action::Punish);
    }

    #[test]
    fn test_frame_bytes_layout() {
        let frame = TelemetryFrame {
            node_id: 9,
            state: 3,
            last_satisfaction: 100,
            reward_probability_pct: 25,
            action: Action::Unknown(7),
            period_seconds: 0xABCD,
        };
        assert_eq!(frame.to_bytes(), [9, 3, 100, 25, 7, 0xCD, 0xAB]);
        assert_eq!(decode(frame.to_base64()).frame(), Some(&frame));
    }

    #[test]
    fn test_action_display() {
        assert_eq!(Action::Reward.to_string(), "REWARD");
        assert_eq!(Action::Punish.to_string(), "PUNISH");
        assert_eq!(Action::from(4).to_string(), "UNKNOWN(4)");
    }
}
