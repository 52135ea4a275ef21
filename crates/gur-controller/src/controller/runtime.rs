//! Controller runtime
//!
//! The MQTT event loop is polled from a single task, which makes it the only
//! inbound handler. Status and target timers run as separate tasks against
//! the same [`Controller`]. Shutdown drains in order: timers, trial log,
//! broker connection.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Outgoing, Packet};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::{Controller, ControllerError, Phase};
use crate::recorder::{TrialLogWriter, WriterStats};
use crate::transport::{MqttPublisher, Publisher};

/// Pause after a broker error before polling (and thus reconnecting) again
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound on waiting for the DISCONNECT packet to leave
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Runtime parameters
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub status_interval: Duration,
    pub target_interval: Duration,
    /// TTN devices whose downlink queue is cleared on connect
    pub clear_queue_devices: Vec<String>,
}

/// Handle one inbound publish: decode, update, record, answer.
///
/// Malformed envelopes are logged and dropped. Persistence and publish
/// failures are logged; neither is retried.
#[instrument(skip_all, fields(topic = %topic))]
pub fn dispatch_uplink(
    controller: &Controller,
    writer: &TrialLogWriter,
    publisher: &dyn Publisher,
    topic: &str,
    payload: &[u8],
    now: Duration,
) -> bool {
    let processed = match controller.handle_envelope(payload, now) {
        Ok(processed) => processed,
        Err(ControllerError::Gur(e)) => {
            warn!(error = %e, "Dropping malformed uplink");
            return false;
        }
        Err(e) => {
            debug!(error = %e, "Uplink ignored");
            return false;
        }
    };

    let record = &processed.record;
    info!(
        trial_id = record.trial_id,
        participant = %record.participant_id,
        dev_eui = processed.uplink.dev_eui.as_deref().unwrap_or("-"),
        f_port = ?processed.uplink.f_port,
        window = record.window_count,
        target = record.target,
        satisfaction = record.satisfaction,
        overload = record.overload,
        active = record.active_participants,
        frame = processed.decoded.is_available(),
        "Uplink processed"
    );

    writer.submit(processed.record);

    if let Err(e) = publisher.publish(&processed.downlink) {
        warn!(error = %e, downlink_topic = %processed.downlink.topic, "Downlink publish failed");
    }
    true
}

/// Owns the controller, the trial-log writer and the timer tasks
pub struct Runtime {
    controller: Arc<Controller>,
    writer: TrialLogWriter,
    settings: RuntimeSettings,
    epoch: Instant,
}

impl Runtime {
    pub fn new(controller: Arc<Controller>, writer: TrialLogWriter, settings: RuntimeSettings) -> Self {
        Self {
            controller,
            writer,
            settings,
            epoch: Instant::now(),
        }
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// Run until `shutdown` resolves, then drain and terminate. Returns the
    /// trial log writer's final counters.
    pub async fn run<F>(
        self,
        client: AsyncClient,
        mut eventloop: EventLoop,
        shutdown: F,
    ) -> WriterStats
    where
        F: Future<Output = ()>,
    {
        let publisher = MqttPublisher::new(client);
        let (stop_tx, stop_rx) = watch::channel(false);
        let timers = spawn_timers(
            self.controller.clone(),
            &self.settings,
            self.epoch,
            stop_rx,
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    break;
                }
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                            if ack.code == ConnectReturnCode::Success {
                                self.on_connected(&publisher);
                            } else {
                                warn!(code = ?ack.code, "Broker refused connection");
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            dispatch_uplink(
                                &self.controller,
                                &self.writer,
                                &publisher,
                                &publish.topic,
                                &publish.payload,
                                self.epoch.elapsed(),
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "MQTT connection error; retrying");
                            tokio::select! {
                                _ = &mut shutdown => {
                                    info!("Received shutdown signal");
                                    break;
                                }
                                _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                            }
                        }
                    }
                }
            }
        }

        self.drain(publisher, eventloop, stop_tx, timers).await
    }

    /// Subscribe after every successful (re)connect; clean sessions do not
    /// keep subscriptions.
    fn on_connected(&self, publisher: &dyn Publisher) {
        let network = &self.controller.settings().network;
        let topic = network.uplink_topic();

        match publisher.subscribe(&topic) {
            Ok(()) => info!(%topic, "Subscribed to uplinks"),
            Err(e) => error!(error = %e, %topic, "Subscribe failed"),
        }

        for device in &self.settings.clear_queue_devices {
            if let Some(message) = network.clear_queue(device) {
                match publisher.publish(&message) {
                    Ok(()) => info!(%device, "Cleared downlink queue"),
                    Err(e) => warn!(error = %e, %device, "Failed to clear downlink queue"),
                }
            }
        }

        if self.controller.phase() == Phase::Connecting {
            if let Err(e) = self.controller.transition(Phase::Running) {
                error!(error = %e, "Unexpected phase on connect");
            }
        }
    }

    async fn drain(
        self,
        publisher: MqttPublisher,
        mut eventloop: EventLoop,
        stop_tx: watch::Sender<bool>,
        timers: Vec<JoinHandle<()>>,
    ) -> WriterStats {
        if let Err(e) = self.controller.transition(Phase::Draining) {
            warn!(error = %e, "Draining from unexpected phase");
        }

        let _ = stop_tx.send(true);
        for timer in timers {
            if let Err(e) = timer.await {
                warn!(error = %e, "Timer task ended abnormally");
            }
        }

        let stats = self.writer.drain().await;

        match publisher.disconnect() {
            Ok(()) => {
                let flushed = tokio::time::timeout(DISCONNECT_GRACE, async {
                    loop {
                        match eventloop.poll().await {
                            Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                            Ok(_) => {}
                        }
                    }
                })
                .await;
                if flushed.is_err() {
                    warn!("Timed out waiting for broker disconnect");
                }
            }
            Err(e) => warn!(error = %e, "Disconnect request failed"),
        }

        if let Err(e) = self.controller.transition(Phase::Terminated) {
            warn!(error = %e, "Could not mark controller terminated");
        }
        info!(trial_id = self.controller.trial_id(), "Controller terminated");
        stats
    }
}

/// Spawn the status and target timers. Both stop when `stop` flips.
pub fn spawn_timers(
    controller: Arc<Controller>,
    settings: &RuntimeSettings,
    epoch: Instant,
    stop: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let status = {
        let controller = controller.clone();
        spawn_periodic(settings.status_interval, stop.clone(), move || {
            let report = controller.status(epoch.elapsed());
            info!(
                trial_id = controller.trial_id(),
                window = report.window.count,
                target = report.target,
                active = report.window.active_participants,
                satisfaction = report.satisfaction,
                lifetime = report.lifetime_uplinks,
                "STATUS {}",
                report
            );
        })
    };

    let target = spawn_periodic(settings.target_interval, stop, move || {
        if let Some((previous, current)) = controller.refresh_target(epoch.elapsed()) {
            info!(previous, current, "Target changed");
        }
    });

    vec![status, target]
}

fn spawn_periodic<F>(period: Duration, mut stop: watch::Receiver<bool>, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => tick(),
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
