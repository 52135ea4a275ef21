//! Controller module
pub mod runtime;
pub mod state;

pub use self::runtime::{Runtime, RuntimeSettings};
pub use self::state::{Controller, ControllerSettings, Phase, Processed, StatusReport};

use gur_common::GurError;
use thiserror::Error;

/// Errors raised by the controller state machine
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Controller is {0}, not accepting uplinks")]
    NotRunning(Phase),

    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error(transparent)]
    Gur(#[from] GurError),
}
