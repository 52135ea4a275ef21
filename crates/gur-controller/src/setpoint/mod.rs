//! Setpoint scheduler module
pub mod schedule;

pub use self::schedule::{ScheduleEntry, TargetSchedule};
