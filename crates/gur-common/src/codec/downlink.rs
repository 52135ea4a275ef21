//! Downlink feedback frame (controller -> node)

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Downlink frame width
///
/// Older controller generations sent only the satisfaction byte. Nodes do
/// not negotiate the width, so it is fixed per deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownlinkWidth {
    /// `[satisfaction, overload_flag]`
    #[default]
    Canonical,
    /// `[satisfaction]`
    Legacy,
}

impl DownlinkWidth {
    pub fn len(self) -> usize {
        match self {
            DownlinkWidth::Canonical => 2,
            DownlinkWidth::Legacy => 1,
        }
    }
}

/// Feedback sent back to the reporting node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownlinkFrame {
    /// 0..=100
    pub satisfaction: u8,
    pub overload: bool,
}

impl DownlinkFrame {
    /// Build from a satisfaction score. The score is clamped to [0, 100]
    /// and truncated, so out-of-range input can never overflow the byte.
    pub fn new(satisfaction: f64, overload: bool) -> Self {
        let clamped = if satisfaction.is_nan() {
            0.0
        } else {
            satisfaction.clamp(0.0, 100.0)
        };
        Self {
            satisfaction: clamped as u8,
            overload,
        }
    }

    pub fn encode(&self, width: DownlinkWidth) -> Vec<u8> {
        match width {
            DownlinkWidth::Canonical => vec![self.satisfaction, u8::from(self.overload)],
            DownlinkWidth::Legacy => vec![self.satisfaction],
        }
    }

    pub fn encode_base64(&self, width: DownlinkWidth) -> String {
        STANDARD.encode(self.encode(width))
    }

    /// Parse a canonical 2-byte frame. Any non-zero flag byte is overload.
    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        match raw {
            [satisfaction, flag] => Ok(Self {
                satisfaction: *satisfaction,
                overload: *flag != 0,
            }),
            _ => Err(FrameError::LengthMismatch {
                expected: DownlinkWidth::Canonical.len(),
                actual: raw.len(),
            }),
        }
    }
}
