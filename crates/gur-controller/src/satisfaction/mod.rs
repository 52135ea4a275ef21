//! Satisfaction (reward) signal
pub mod calculator;

pub use self::calculator::{SatisfactionFn, DEFAULT_DECAY};
