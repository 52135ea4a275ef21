//! Gur controller binary

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gur_controller::{
    config::ControllerConfig,
    controller::{Controller, ControllerSettings, Runtime, RuntimeSettings},
    recorder::{TrialLog, TrialLogWriter},
    transport::MqttTransport,
    CONTROLLER_VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        common = gur_common::VERSION,
        "Starting Gur controller v{}", CONTROLLER_VERSION
    );

    let config = ControllerConfig::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    let schedule = config.target_schedule()?;

    let trial_log = TrialLog::open(&config.trial_log.path);
    let trial_id = trial_log.next_trial_id().with_context(|| {
        format!("failed to recover trial id from {}", trial_log.path().display())
    })?;

    info!(
        trial_id,
        started_at = %chrono::Utc::now().to_rfc3339(),
        flavor = ?config.network_server.flavor,
        application = %config.network_server.application_id,
        window_seconds = config.window.window_seconds,
        decay = config.window.decay,
        schedule = ?schedule.entries(),
        log = %config.trial_log.path.display(),
        "Trial configured"
    );

    let controller = Arc::new(Controller::new(ControllerSettings {
        trial_id,
        window: config.window.window(),
        schedule,
        satisfaction: config.satisfaction(),
        network: config.network_server(),
        downlink_f_port: config.network_server.f_port,
        downlink_width: config.network_server.downlink_width,
    }));

    let writer = TrialLogWriter::spawn(trial_log);
    let runtime = Runtime::new(
        controller,
        writer,
        RuntimeSettings {
            status_interval: Duration::from_secs(config.timers.status_interval_seconds),
            target_interval: Duration::from_secs(config.timers.target_interval_seconds),
            clear_queue_devices: config.network_server.clear_queue_devices.clone(),
        },
    );

    let (client, eventloop) = MqttTransport::new(&config.broker).connect();
    let stats = runtime.run(client, eventloop, shutdown_signal()).await;

    info!(
        trial_id,
        written = stats.written,
        failed = stats.failed,
        "Shutting down Gur controller"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
