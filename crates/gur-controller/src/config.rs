//! Controller configuration
//!
//! Layered with the `config` crate: struct defaults, then an optional TOML
//! file (`GUR_CONFIG`, default `gur.toml`), then `GUR_*` environment
//! variables using `__` for nesting, e.g. `GUR_WINDOW__WINDOW_SECONDS=900`.

use std::path::PathBuf;
use std::time::Duration;

use gur_common::{DownlinkWidth, Flavor, GurError, NetworkServer, Result};
use serde::{Deserialize, Serialize};

use crate::satisfaction::{SatisfactionFn, DEFAULT_DECAY};
use crate::setpoint::{ScheduleEntry, TargetSchedule};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "GUR_CONFIG";

/// Controller service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// MQTT broker connection
    pub broker: BrokerSettings,
    /// Network server topic layout
    pub network_server: NetworkServerSettings,
    /// Sliding window and satisfaction curve
    pub window: WindowSettings,
    /// Target schedule, ascending by offset
    pub schedule: ScheduleSettings,
    /// Periodic timers
    pub timers: TimerSettings,
    /// Durable trial log
    pub trial_log: TrialLogSettings,
}

impl ControllerConfig {
    /// Load configuration from `.env`, the config file and the environment
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "gur.toml".to_string());
        Self::load_from(PathBuf::from(path))
    }

    pub fn load_from(path: PathBuf) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("GUR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .map_err(|e| GurError::Config(e.to_string()))
    }

    /// Fail-fast checks run before the controller starts
    pub fn validate(&self) -> Result<()> {
        if self.network_server.application_id.trim().is_empty() {
            return Err(GurError::Config("network_server.application_id is required".into()));
        }
        if !self.window.decay.is_finite() || self.window.decay < 0.0 {
            return Err(GurError::Config(format!(
                "window.decay must be a non-negative number, got {}",
                self.window.decay
            )));
        }
        if self.timers.status_interval_seconds == 0 || self.timers.target_interval_seconds == 0 {
            return Err(GurError::Config("timer intervals must be at least 1 second".into()));
        }
        if self.broker.keep_alive_secs < 5 {
            return Err(GurError::Config("broker.keep_alive_secs must be at least 5".into()));
        }
        if self.broker.request_capacity == 0 {
            return Err(GurError::Config("broker.request_capacity must be positive".into()));
        }
        self.target_schedule()?;
        Ok(())
    }

    pub fn target_schedule(&self) -> Result<TargetSchedule> {
        Ok(TargetSchedule::new(self.schedule.entries.clone())?)
    }

    pub fn satisfaction(&self) -> SatisfactionFn {
        SatisfactionFn::new(self.window.decay)
    }

    pub fn network_server(&self) -> NetworkServer {
        NetworkServer::new(
            self.network_server.flavor,
            self.network_server.application_id.clone(),
            self.network_server.tenant.clone(),
        )
    }
}

/// MQTT broker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Outbound request queue depth
    pub request_capacity: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "gur-controller".to_string(),
            keep_alive_secs: 60,
            username: None,
            password: None,
            request_capacity: 64,
        }
    }
}

/// Network server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkServerSettings {
    pub flavor: Flavor,
    pub application_id: String,
    /// TTN tenant, ignored for ChirpStack
    pub tenant: String,
    /// fPort used for feedback downlinks
    pub f_port: u8,
    pub downlink_width: DownlinkWidth,
    /// Devices whose downlink queue is emptied on connect (TTN only)
    pub clear_queue_devices: Vec<String>,
}

impl Default for NetworkServerSettings {
    fn default() -> Self {
        Self {
            flavor: Flavor::ChirpStack,
            application_id: String::new(),
            tenant: "ttn".to_string(),
            f_port: 2,
            downlink_width: DownlinkWidth::Canonical,
            clear_queue_devices: Vec::new(),
        }
    }
}

/// Window settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub window_seconds: u64,
    /// Satisfaction decay `k`
    pub decay: f64,
}

impl WindowSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            window_seconds: 300,
            decay: DEFAULT_DECAY,
        }
    }
}

/// Schedule settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub entries: Vec<ScheduleEntry>,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            entries: vec![ScheduleEntry::new(0, 10)],
        }
    }
}

/// Timer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    pub status_interval_seconds: u64,
    pub target_interval_seconds: u64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            status_interval_seconds: 60,
            target_interval_seconds: 10,
        }
    }
}

/// Trial log settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialLogSettings {
    pub path: PathBuf,
}

impl Default for TrialLogSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("gur_log.csv"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> ControllerConfig {
        let mut cfg = ControllerConfig::default();
        cfg.network_server.application_id = "app".into();
        cfg
    }

    #[test]
    fn test_defaults_are_valid_once_app_is_set() {
        assert!(ControllerConfig::default().validate().is_err());
        valid().validate().unwrap();
    }

    #[test]
    fn test_empty_schedule_is_fatal() {
        let mut cfg = valid();
        cfg.schedule.entries.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_negative_decay_is_fatal() {
        let mut cfg = valid();
        cfg.window.decay = -0.1;
        assert!(matches!(cfg.validate(), Err(GurError::Config(_))));
    }

    #[test]
    fn test_zero_timer_is_fatal() {
        let mut cfg = valid();
        cfg.timers.status_interval_seconds = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gur.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"
[network_server]
flavor = "ttn"
application_id = "pfc-game-theory"
downlink_width = "legacy"
clear_queue_devices = ["node-1", "node-2"]

[window]
window_seconds = 900
decay = 0.002

[[schedule.entries]]
offset_seconds = 0
target = 40

[[schedule.entries]]
offset_seconds = 600
target = 60
"#
        )
        .unwrap();
        drop(file);

        let cfg = ControllerConfig::load_from(path).unwrap();
        cfg.validate().unwrap();

        assert_eq!(cfg.network_server.flavor, Flavor::Ttn);
        assert_eq!(cfg.network_server.downlink_width, DownlinkWidth::Legacy);
        assert_eq!(cfg.network_server.clear_queue_devices.len(), 2);
        assert_eq!(cfg.window.window(), Duration::from_secs(900));
        assert_eq!(cfg.target_schedule().unwrap().target_at(650), 60);
        // Untouched sections keep their defaults
        assert_eq!(cfg.broker.port, 1883);
        assert_eq!(cfg.timers.status_interval_seconds, 60);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ControllerConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.window.window_seconds, 300);
        assert_eq!(cfg.window.decay, DEFAULT_DECAY);
        assert_eq!(cfg.trial_log.path, PathBuf::from("gur_log.csv"));
    }
}
