//! Sliding-window arrival store
//!
//! Arrivals are kept in insertion order and compacted lazily: every
//! [`WindowStore::snapshot`] evicts expired records and counts the
//! survivors in the same pass. There is no background sweeper.

use std::collections::HashSet;
use std::time::Duration;

/// One accepted uplink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrivalRecord {
    /// Offset from the start of the trial
    pub timestamp: Duration,
    pub participant_id: String,
}

/// Window statistics at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub count: usize,
    pub active_participants: usize,
}

/// Append-only arrival log with horizon eviction
#[derive(Debug, Default)]
pub struct WindowStore {
    arrivals: Vec<ArrivalRecord>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an arrival
    pub fn record(&mut self, participant_id: impl Into<String>, at: Duration) {
        self.arrivals.push(ArrivalRecord {
            timestamp: at,
            participant_id: participant_id.into(),
        });
    }

    /// Evict records older than `now - window`, then count what is left.
    ///
    /// The boundary is strict: a record stamped exactly at the horizon
    /// survives. Records need not be sorted.
    pub fn snapshot(&mut self, now: Duration, window: Duration) -> WindowSnapshot {
        if let Some(horizon) = now.checked_sub(window) {
            self.arrivals.retain(|arrival| arrival.timestamp >= horizon);
        }

        let active: HashSet<&str> = self
            .arrivals
            .iter()
            .map(|arrival| arrival.participant_id.as_str())
            .collect();

        WindowSnapshot {
            count: self.arrivals.len(),
            active_participants: active.len(),
        }
    }

    /// Records currently held, expired or not
    pub fn len(&self) -> usize {
        self.arrivals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrivals.is_empty()
    }
}
