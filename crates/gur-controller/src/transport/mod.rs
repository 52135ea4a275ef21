//! Transport seam
//!
//! The controller hands finished messages and subscriptions to the broker
//! client; connecting and reconnecting belong to the MQTT layer in
//! [`mqtt`].

pub mod mqtt;

pub use self::mqtt::{MqttPublisher, MqttTransport};

use gur_common::{GurError, OutboundMessage};

/// Fire-and-forget broker client. Implementations must not block: a full
/// or closed outbound queue is reported as an error and never retried.
#[cfg_attr(test, mockall::automock)]
pub trait Publisher: Send + Sync {
    fn publish(&self, message: &OutboundMessage) -> Result<(), GurError>;

    /// Queue a subscription at most once delivery
    fn subscribe(&self, topic: &str) -> Result<(), GurError>;
}
