//! Piecewise-constant target schedule

use gur_common::ScheduleError;
use serde::{Deserialize, Serialize};

/// Target that applies from `offset_seconds` onwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub offset_seconds: u64,
    pub target: u32,
}

impl ScheduleEntry {
    pub fn new(offset_seconds: u64, target: u32) -> Self {
        Self {
            offset_seconds,
            target,
        }
    }
}

/// Validated schedule: non-empty, strictly increasing offsets, positive targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSchedule {
    entries: Vec<ScheduleEntry>,
}

impl TargetSchedule {
    pub fn new(entries: Vec<ScheduleEntry>) -> Result<Self, ScheduleError> {
        if entries.is_empty() {
            return Err(ScheduleError::Empty);
        }

        for (i, entry) in entries.iter().enumerate() {
            if entry.target == 0 {
                return Err(ScheduleError::ZeroTarget {
                    offset: entry.offset_seconds,
                });
            }
            if let Some(previous) = i.checked_sub(1).map(|p| entries[p]) {
                if entry.offset_seconds <= previous.offset_seconds {
                    return Err(ScheduleError::NonIncreasingOffset {
                        previous: previous.offset_seconds,
                        offset: entry.offset_seconds,
                    });
                }
            }
        }

        Ok(Self { entries })
    }

    /// Single-entry schedule
    pub fn constant(target: u32) -> Result<Self, ScheduleError> {
        Self::new(vec![ScheduleEntry::new(0, target)])
    }

    /// Target of the last entry whose offset is `<= elapsed_seconds`, or the
    /// first entry's target before any offset is reached.
    pub fn target_at(&self, elapsed_seconds: u64) -> u32 {
        let reached = self
            .entries
            .partition_point(|entry| entry.offset_seconds <= elapsed_seconds);
        self.entries[reached.saturating_sub(1)].target
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }
}
