//! Network-server JSON envelopes and topic layout
//!
//! Two LoRaWAN network servers are supported:
//!
//! | Flavor      | Uplink topic                              | Downlink topic                                   |
//! |-------------|-------------------------------------------|--------------------------------------------------|
//! | ChirpStack  | `application/{app}/device/+/event/up`     | `application/{app}/device/{dev_eui}/command/down` |
//! | TTN v3      | `v3/{app}@{tenant}/devices/+/up`          | `v3/{app}@{tenant}/devices/{device_id}/down/push` |

use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

/// Network server flavor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    #[default]
    ChirpStack,
    Ttn,
}

/// Uplink normalized across flavors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uplink {
    /// Identity counted in the window (device name when known)
    pub participant_id: String,
    pub dev_eui: Option<String>,
    /// Identifier used in the downlink topic
    pub downlink_address: String,
    pub f_port: Option<u8>,
    pub f_cnt: Option<u32>,
    /// Base64 telemetry frame
    pub data: Option<String>,
}

/// A message ready to publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChirpStackUplink {
    device_info: Option<ChirpStackDeviceInfo>,
    f_port: Option<u8>,
    f_cnt: Option<u32>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChirpStackDeviceInfo {
    dev_eui: Option<String>,
    device_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChirpStackDownlink<'a> {
    dev_eui: &'a str,
    confirmed: bool,
    #[serde(rename = "f_port")]
    f_port: u8,
    data: String,
}

#[derive(Debug, Deserialize)]
struct TtnUplink {
    end_device_ids: Option<TtnDeviceIds>,
    uplink_message: Option<TtnUplinkMessage>,
}

#[derive(Debug, Deserialize)]
struct TtnDeviceIds {
    device_id: Option<String>,
    dev_eui: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TtnUplinkMessage {
    f_port: Option<u8>,
    f_cnt: Option<u32>,
    frm_payload: Option<String>,
}

#[derive(Debug, Serialize)]
struct TtnDownlinks {
    downlinks: Vec<TtnDownlink>,
}

#[derive(Debug, Serialize)]
struct TtnDownlink {
    f_port: u8,
    frm_payload: String,
    confirmed: bool,
}

/// Topic layout and envelope codec for one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkServer {
    pub flavor: Flavor,
    pub application_id: String,
    /// TTN tenant (`ttn` on the public community network)
    pub tenant: String,
}

impl NetworkServer {
    pub fn new(flavor: Flavor, application_id: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            flavor,
            application_id: application_id.into(),
            tenant: tenant.into(),
        }
    }

    fn ttn_prefix(&self) -> String {
        format!("v3/{}@{}/devices", self.application_id, self.tenant)
    }

    /// Wildcard uplink subscription covering every device
    pub fn uplink_topic(&self) -> String {
        match self.flavor {
            Flavor::ChirpStack => format!("application/{}/device/+/event/up", self.application_id),
            Flavor::Ttn => format!("{}/+/up", self.ttn_prefix()),
        }
    }

    pub fn downlink_topic(&self, address: &str) -> String {
        match self.flavor {
            Flavor::ChirpStack => {
                format!("application/{}/device/{}/command/down", self.application_id, address)
            }
            Flavor::Ttn => format!("{}/{}/down/push", self.ttn_prefix(), address),
        }
    }

    /// Parse an uplink envelope into the flavor-neutral [`Uplink`]
    pub fn parse_uplink(&self, payload: &[u8]) -> Result<Uplink, EnvelopeError> {
        match self.flavor {
            Flavor::ChirpStack => {
                let env: ChirpStackUplink = serde_json::from_slice(payload)?;
                let info = env
                    .device_info
                    .ok_or(EnvelopeError::MissingField("deviceInfo"))?;
                let dev_eui = info
                    .dev_eui
                    .ok_or(EnvelopeError::MissingField("deviceInfo.devEui"))?;
                Ok(Uplink {
                    participant_id: info.device_name.unwrap_or_else(|| dev_eui.clone()),
                    downlink_address: dev_eui.clone(),
                    dev_eui: Some(dev_eui),
                    f_port: env.f_port,
                    f_cnt: env.f_cnt,
                    data: env.data,
                })
            }
            Flavor::Ttn => {
                let env: TtnUplink = serde_json::from_slice(payload)?;
                let ids = env
                    .end_device_ids
                    .ok_or(EnvelopeError::MissingField("end_device_ids"))?;
                let device_id = ids
                    .device_id
                    .ok_or(EnvelopeError::MissingField("end_device_ids.device_id"))?;
                let message = env
                    .uplink_message
                    .ok_or(EnvelopeError::MissingField("uplink_message"))?;
                Ok(Uplink {
                    participant_id: device_id.clone(),
                    downlink_address: device_id,
                    dev_eui: ids.dev_eui,
                    f_port: message.f_port,
                    f_cnt: message.f_cnt,
                    data: message.frm_payload,
                })
            }
        }
    }

    /// Unconfirmed downlink carrying `frame` to `address`
    pub fn downlink(
        &self,
        address: &str,
        f_port: u8,
        frame: &[u8],
    ) -> Result<OutboundMessage, EnvelopeError> {
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let data = STANDARD.encode(frame);
        let payload = match self.flavor {
            Flavor::ChirpStack => serde_json::to_vec(&ChirpStackDownlink {
                dev_eui: address,
                confirmed: false,
                f_port,
                data,
            })?,
            Flavor::Ttn => serde_json::to_vec(&TtnDownlinks {
                downlinks: vec![TtnDownlink {
                    f_port,
                    frm_payload: data,
                    confirmed: false,
                }],
            })?,
        };

        Ok(OutboundMessage {
            topic: self.downlink_topic(address),
            payload,
        })
    }

    /// Message that empties a device's pending downlink queue.
    /// ChirpStack has no MQTT equivalent, so this is TTN only.
    pub fn clear_queue(&self, address: &str) -> Option<OutboundMessage> {
        match self.flavor {
            Flavor::ChirpStack => None,
            Flavor::Ttn => Some(OutboundMessage {
                topic: format!("{}/{}/down/replace", self.ttn_prefix(), address),
                payload: br#"{"downlinks":[]}"#.to_vec(),
            }),
        }
    }
}
