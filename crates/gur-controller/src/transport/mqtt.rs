//! MQTT client for the network server's integration broker

use std::time::Duration;

use gur_common::{GurError, OutboundMessage};
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use tracing::{debug, info};

use super::Publisher;
use crate::config::BrokerSettings;

/// Builds the rumqttc client/event-loop pair from configuration
pub struct MqttTransport {
    options: MqttOptions,
    request_capacity: usize,
}

impl MqttTransport {
    pub fn new(settings: &BrokerSettings) -> Self {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
        options.set_clean_session(true);
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            options.set_credentials(username, password);
        }

        Self {
            options,
            request_capacity: settings.request_capacity,
        }
    }

    /// Create the client. Nothing touches the network until the event loop
    /// is polled.
    pub fn connect(self) -> (AsyncClient, EventLoop) {
        let (host, port) = self.options.broker_address();
        info!(%host, port, client_id = %self.options.client_id(), "Connecting to MQTT broker");
        AsyncClient::new(self.options, self.request_capacity)
    }
}

/// Publishes through the client's request queue without awaiting it
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }

    pub fn disconnect(&self) -> Result<(), GurError> {
        self.client
            .try_disconnect()
            .map_err(|e| GurError::Transport(e.to_string()))
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, message: &OutboundMessage) -> Result<(), GurError> {
        debug!(topic = %message.topic, bytes = message.payload.len(), "Publishing");
        self.client
            .try_publish(
                message.topic.as_str(),
                QoS::AtMostOnce,
                false,
                message.payload.clone(),
            )
            .map_err(|e| GurError::Transport(e.to_string()))
    }

    fn subscribe(&self, topic: &str) -> Result<(), GurError> {
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| GurError::Transport(e.to_string()))
    }
}
