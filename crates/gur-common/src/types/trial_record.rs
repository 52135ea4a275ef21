//! Trial record: one row of the durable trial log per processed uplink

use serde::{Deserialize, Serialize};

use crate::codec::{TelemetryFrame, UNAVAILABLE_MARKER};

/// Bumped whenever [`TRIAL_LOG_COLUMNS`] changes
pub const TRIAL_LOG_SCHEMA_VERSION: u32 = 1;

/// Fixed column order of the trial log
pub const TRIAL_LOG_COLUMNS: [&str; 15] = [
    "trial_id",
    "sim_time_seconds",
    "participant_id",
    "node_id",
    "frame_counter",
    "window_count",
    "target",
    "satisfaction",
    "overload_flag",
    "node_state",
    "node_action",
    "node_period",
    "node_last_satisfaction",
    "node_reward_probability",
    "active_participants",
];

/// A processed uplink as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial_id: u64,
    /// Seconds since the controller started this trial
    pub sim_time_seconds: f64,
    pub participant_id: String,
    /// Absent when the envelope carried no frame counter
    pub frame_counter: Option<u32>,
    pub window_count: usize,
    pub target: u32,
    pub satisfaction: f64,
    pub overload: bool,
    pub active_participants: usize,
    /// `None` when the telemetry frame was unavailable
    pub node: Option<TelemetryFrame>,
}

impl TrialRecord {
    /// Render as a row in [`TRIAL_LOG_COLUMNS`] order. Node columns of an
    /// unavailable frame carry [`UNAVAILABLE_MARKER`].
    pub fn to_row(&self) -> Vec<String> {
        let node = |f: &dyn Fn(&TelemetryFrame) -> String| match &self.node {
            Some(frame) => f(frame),
            None => UNAVAILABLE_MARKER.to_string(),
        };

        vec![
            self.trial_id.to_string(),
            format!("{:.3}", self.sim_time_seconds),
            self.participant_id.clone(),
            node(&|n| n.node_id.to_string()),
            self.frame_counter.map(|c| c.to_string()).unwrap_or_default(),
            self.window_count.to_string(),
            self.target.to_string(),
            format!("{:.2}", self.satisfaction),
            u8::from(self.overload).to_string(),
            node(&|n| n.state.to_string()),
            node(&|n| n.action.to_string()),
            node(&|n| n.period_seconds.to_string()),
            node(&|n| n.last_satisfaction.to_string()),
            node(&|n| format!("{:.2}", n.reward_probability())),
            self.active_participants.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Action;

    fn record(node: Option<TelemetryFrame>) -> TrialRecord {
        TrialRecord {
            trial_id: 3,
            sim_time_seconds: 12.5,
            participant_id: "node-a".into(),
            frame_counter: Some(41),
            window_count: 9,
            target: 10,
            satisfaction: 98.42,
            overload: false,
            active_participants: 2,
            node,
        }
    }

    #[test]
    fn test_row_matches_columns() {
        assert_eq!(record(None).to_row().len(), TRIAL_LOG_COLUMNS.len());
    }

    #[test]
    fn test_row_with_frame() {
        let row = record(Some(TelemetryFrame {
            node_id: 5,
            state: 2,
            last_satisfaction: 80,
            reward_probability_pct: 60,
            action: Action::Reward,
            period_seconds: 300,
        }))
        .to_row();

        assert_eq!(
            row,
            vec![
                "3", "12.500", "node-a", "5", "41", "9", "10", "98.42", "0", "2", "REWARD",
                "300", "80", "0.60", "2"
            ]
        );
    }

    #[test]
    fn test_unavailable_frame_uses_marker() {
        let row = record(None).to_row();
        for column in [3, 9, 10, 11, 12, 13] {
            assert_eq!(row[column], UNAVAILABLE_MARKER, "column {}", TRIAL_LOG_COLUMNS[column]);
        }
        // Controller-side columns are unaffected
        assert_eq!(row[7], "98.42");
    }

    #[test]
    fn test_missing_frame_counter_is_blank() {
        let mut rec = record(None);
        rec.frame_counter = None;
        assert_eq!(rec.to_row()[4], "");
    }
}
