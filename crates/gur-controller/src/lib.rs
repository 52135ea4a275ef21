//! # Gur Controller
//!
//! Adaptive reporting-rate controller for a population of LoRaWAN nodes.
//!
//! Nodes report on their own period; the controller counts arrivals over a
//! sliding window, compares the count with a time-varying target, and answers
//! every uplink with a satisfaction score the node's Gur Game automaton uses
//! to lengthen or shorten its period.
//!
//! ## Satisfaction
//!
//! ```text
//! s = clamp(20 + 80 · exp(−k · (observed − target)²), 0, 100)
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Runtime                              │
//! │  MQTT event loop ──► Controller ──► TrialLogWriter (CSV)     │
//! │        ▲              │  WindowStore                         │
//! │        │              │  TargetSchedule                      │
//! │        └── downlink ◄─┘  SatisfactionFn                      │
//! │  status timer / target timer ──► Controller                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod controller;
pub mod recorder;
pub mod satisfaction;
pub mod setpoint;
pub mod transport;
pub mod window;

pub use config::ControllerConfig;
pub use controller::{
    Controller, ControllerError, ControllerSettings, Phase, Processed, Runtime, RuntimeSettings,
    StatusReport,
};
pub use recorder::{TrialLog, TrialLogWriter};
pub use satisfaction::SatisfactionFn;
pub use setpoint::{ScheduleEntry, TargetSchedule};
pub use window::{WindowSnapshot, WindowStore};

/// Controller version
pub const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");
