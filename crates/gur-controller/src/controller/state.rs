//! Controller state shared by the uplink handler and the timers
//!
//! All mutable state sits behind one mutex. The lock is held only for the
//! window update and target lookup; decoding, scoring, record building and
//! publishing all happen outside it.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use gur_common::{
    decode, DecodedFrame, DownlinkFrame, DownlinkWidth, NetworkServer, OutboundMessage,
    TrialRecord, Uplink,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::ControllerError;
use crate::satisfaction::SatisfactionFn;
use crate::setpoint::TargetSchedule;
use crate::window::{WindowSnapshot, WindowStore};

/// Lifecycle of one trial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Running,
    Draining,
    Terminated,
}

impl Phase {
    fn can_transition_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Connecting, Phase::Running)
                | (Phase::Connecting, Phase::Draining)
                | (Phase::Running, Phase::Draining)
                | (Phase::Draining, Phase::Terminated)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Connecting => "connecting",
            Phase::Running => "running",
            Phase::Draining => "draining",
            Phase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Static controller parameters
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub trial_id: u64,
    pub window: Duration,
    pub schedule: TargetSchedule,
    pub satisfaction: SatisfactionFn,
    pub network: NetworkServer,
    pub downlink_f_port: u8,
    pub downlink_width: DownlinkWidth,
}

/// Outcome of one accepted uplink
#[derive(Debug, Clone)]
pub struct Processed {
    pub uplink: Uplink,
    pub record: TrialRecord,
    pub feedback: DownlinkFrame,
    pub downlink: OutboundMessage,
    pub decoded: DecodedFrame,
}

/// Periodic status line
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub elapsed: Duration,
    pub window: WindowSnapshot,
    pub target: u32,
    pub satisfaction: f64,
    pub overload: bool,
    pub lifetime_uplinks: u64,
    pub known_participants: usize,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={}s msgs={}/{} active={} satisfaction={:.2}% overload={} lifetime={} known={}",
            self.elapsed.as_secs(),
            self.window.count,
            self.target,
            self.window.active_participants,
            self.satisfaction,
            u8::from(self.overload),
            self.lifetime_uplinks,
            self.known_participants,
        )
    }
}

#[derive(Debug)]
struct SharedState {
    phase: Phase,
    window: WindowStore,
    current_target: u32,
    /// Accepted uplinks per participant over the whole trial
    lifetime: HashMap<String, u64>,
}

/// Owns the window store and current target for one trial
pub struct Controller {
    settings: ControllerSettings,
    state: Mutex<SharedState>,
}

impl Controller {
    pub fn new(settings: ControllerSettings) -> Self {
        let initial_target = settings.schedule.target_at(0);
        Self {
            settings,
            state: Mutex::new(SharedState {
                phase: Phase::Connecting,
                window: WindowStore::new(),
                current_target: initial_target,
                lifetime: HashMap::new(),
            }),
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn trial_id(&self) -> u64 {
        self.settings.trial_id
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn current_target(&self) -> u32 {
        self.state.lock().current_target
    }

    /// Move to `next`, returning the previous phase
    pub fn transition(&self, next: Phase) -> Result<Phase, ControllerError> {
        let mut state = self.state.lock();
        let previous = state.phase;
        if !previous.can_transition_to(next) {
            return Err(ControllerError::InvalidTransition {
                from: previous,
                to: next,
            });
        }
        state.phase = next;
        info!(trial_id = self.settings.trial_id, from = %previous, to = %next, "Controller phase changed");
        Ok(previous)
    }

    /// Parse a raw uplink envelope and process it
    pub fn handle_envelope(
        &self,
        payload: &[u8],
        now: Duration,
    ) -> Result<Processed, ControllerError> {
        let uplink = self
            .settings
            .network
            .parse_uplink(payload)
            .map_err(gur_common::GurError::from)?;
        self.process_uplink(&uplink, now)
    }

    /// Record an arrival and compute the feedback for its sender.
    ///
    /// A frame that fails to decode still counts as an arrival and still
    /// gets a satisfaction value; its node columns are marked unavailable.
    pub fn process_uplink(
        &self,
        uplink: &Uplink,
        now: Duration,
    ) -> Result<Processed, ControllerError> {
        let decoded = decode(uplink.data.as_deref().unwrap_or_default());
        if let DecodedFrame::Unavailable(reason) = &decoded {
            debug!(participant = %uplink.participant_id, %reason, "Telemetry frame unavailable");
        }

        let (snapshot, target) = {
            let mut state = self.state.lock();
            if state.phase != Phase::Running {
                return Err(ControllerError::NotRunning(state.phase));
            }

            state.window.record(uplink.participant_id.clone(), now);
            let snapshot = state.window.snapshot(now, self.settings.window);
            let target = self.settings.schedule.target_at(now.as_secs());
            state.current_target = target;
            *state
                .lifetime
                .entry(uplink.participant_id.clone())
                .or_default() += 1;
            (snapshot, target)
        };

        let observed = u32::try_from(snapshot.count).unwrap_or(u32::MAX);
        let satisfaction = self.settings.satisfaction.score(observed, target);
        let overload = SatisfactionFn::is_overload(observed, target);
        let feedback = DownlinkFrame::new(satisfaction, overload);

        let downlink = self
            .settings
            .network
            .downlink(
                &uplink.downlink_address,
                self.settings.downlink_f_port,
                &feedback.encode(self.settings.downlink_width),
            )
            .map_err(gur_common::GurError::from)?;

        let record = TrialRecord {
            trial_id: self.settings.trial_id,
            sim_time_seconds: now.as_secs_f64(),
            participant_id: uplink.participant_id.clone(),
            frame_counter: uplink.f_cnt,
            window_count: snapshot.count,
            target,
            satisfaction,
            overload,
            active_participants: snapshot.active_participants,
            node: decoded.frame().copied(),
        };

        Ok(Processed {
            uplink: uplink.clone(),
            record,
            feedback,
            downlink,
            decoded,
        })
    }

    /// Re-derive the window without an inbound event
    pub fn status(&self, now: Duration) -> StatusReport {
        let (snapshot, target, lifetime_uplinks, known_participants) = {
            let mut state = self.state.lock();
            let snapshot = state.window.snapshot(now, self.settings.window);
            (
                snapshot,
                state.current_target,
                state.lifetime.values().sum::<u64>(),
                state.lifetime.len(),
            )
        };

        let observed = u32::try_from(snapshot.count).unwrap_or(u32::MAX);
        StatusReport {
            elapsed: now,
            window: snapshot,
            target,
            satisfaction: self.settings.satisfaction.score(observed, target),
            overload: SatisfactionFn::is_overload(observed, target),
            lifetime_uplinks,
            known_participants,
        }
    }

    /// Re-evaluate the schedule. Returns `(old, new)` when the target changed.
    pub fn refresh_target(&self, now: Duration) -> Option<(u32, u32)> {
        let scheduled = self.settings.schedule.target_at(now.as_secs());
        let mut state = self.state.lock();
        if state.current_target == scheduled {
            return None;
        }
        let previous = std::mem::replace(&mut state.current_target, scheduled);
        Some((previous, scheduled))
    }

    /// Accepted uplinks for one participant over the whole trial
    pub fn lifetime_uplinks(&self, participant_id: &str) -> u64 {
        self.state
            .lock()
            .lifetime
            .get(participant_id)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setpoint::ScheduleEntry;
    use gur_common::{Flavor, TelemetryFrame, Action, UNAVAILABLE_MARKER};

    fn settings(schedule: TargetSchedule) -> ControllerSettings {
        ControllerSettings {
            trial_id: 7,
            window: Duration::from_secs(300),
            schedule,
            satisfaction: SatisfactionFn::default(),
            network: NetworkServer::new(Flavor::ChirpStack, "app", "ttn"),
            downlink_f_port: 2,
            downlink_width: DownlinkWidth::Canonical,
        }
    }

    fn running(schedule: TargetSchedule) -> Controller {
        let controller = Controller::new(settings(schedule));
        controller.transition(Phase::Running).unwrap();
        controller
    }

    fn uplink(name: &str, data: Option<String>) -> Uplink {
        Uplink {
            participant_id: name.into(),
            dev_eui: Some(format!("eui-{name}")),
            downlink_address: format!("eui-{name}"),
            f_port: Some(2),
            f_cnt: Some(1),
            data,
        }
    }

    fn frame() -> TelemetryFrame {
        TelemetryFrame {
            node_id: 5,
            state: 2,
            last_satisfaction: 80,
            reward_probability_pct: 60,
            action: Action::Reward,
            period_seconds: 300,
        }
    }

    #[test]
    fn test_phase_transitions() {
        let controller = Controller::new(settings(TargetSchedule::constant(10).unwrap()));
        assert_eq!(controller.phase(), Phase::Connecting);
        assert!(controller.transition(Phase::Terminated).is_err());
        controller.transition(Phase::Running).unwrap();
        assert!(controller.transition(Phase::Running).is_err());
        controller.transition(Phase::Draining).unwrap();
        controller.transition(Phase::Terminated).unwrap();
        assert!(controller.transition(Phase::Running).is_err());
    }

    #[test]
    fn test_rejects_uplink_unless_running() {
        let controller = Controller::new(settings(TargetSchedule::constant(10).unwrap()));
        let err = controller
            .process_uplink(&uplink("a", None), Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, ControllerError::NotRunning(Phase::Connecting)));
        assert_eq!(controller.status(Duration::ZERO).window.count, 0);
    }

    #[test]
    fn test_single_uplink() {
        let controller = running(TargetSchedule::constant(1).unwrap());
        let processed = controller
            .process_uplink(&uplink("a", Some(frame().to_base64())), Duration::from_secs(3))
            .unwrap();

        assert_eq!(processed.record.window_count, 1);
        assert_eq!(processed.record.satisfaction, 100.0);
        assert!(!processed.record.overload);
        assert_eq!(processed.record.node, Some(frame()));
        assert_eq!(processed.feedback, DownlinkFrame { satisfaction: 100, overload: false });
        assert_eq!(processed.downlink.topic, "application/app/device/eui-a/command/down");
        assert_eq!(processed.uplink.dev_eui.as_deref(), Some("eui-a"));
        assert_eq!(processed.uplink.f_port, Some(2));
    }

    #[test]
    fn test_overload_flag() {
        let controller = running(TargetSchedule::constant(2).unwrap());
        let mut last = None;
        for i in 0..3 {
            last = Some(
                controller
                    .process_uplink(&uplink("a", None), Duration::from_secs(i))
                    .unwrap(),
            );
        }
        let processed = last.unwrap();
        assert!(processed.record.overload);
        assert!(processed.feedback.overload);
        // 20 + 80·exp(-0.02) = 98.42, truncated on the wire
        assert_eq!(processed.feedback.satisfaction, 98);
    }

    #[test]
    fn test_unavailable_frame_still_answered() {
        let controller = running(TargetSchedule::constant(1).unwrap());
        let processed = controller
            .process_uplink(&uplink("a", Some("!!".into())), Duration::ZERO)
            .unwrap();

        assert!(!processed.decoded.is_available());
        assert!(processed.record.node.is_none());
        assert_eq!(processed.record.to_row()[3], UNAVAILABLE_MARKER);
        assert_eq!(processed.record.satisfaction, 100.0);
    }

    #[test]
    fn test_malformed_envelope_does_not_touch_window() {
        let controller = running(TargetSchedule::constant(1).unwrap());
        let err = controller
            .handle_envelope(b"{broken", Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, ControllerError::Gur(_)));
        assert_eq!(controller.status(Duration::ZERO).window.count, 0);
    }

    #[test]
    fn test_target_follows_schedule() {
        let schedule =
            TargetSchedule::new(vec![ScheduleEntry::new(0, 40), ScheduleEntry::new(600, 60)])
                .unwrap();
        let controller = running(schedule);

        assert_eq!(controller.refresh_target(Duration::from_secs(599)), None);
        assert_eq!(controller.refresh_target(Duration::from_secs(600)), Some((40, 60)));
        assert_eq!(controller.current_target(), 60);

        let processed = controller
            .process_uplink(&uplink("a", None), Duration::from_secs(700))
            .unwrap();
        assert_eq!(processed.record.target, 60);
    }

    #[test]
    fn test_status_and_lifetime_counts() {
        let controller = running(TargetSchedule::constant(10).unwrap());
        controller.process_uplink(&uplink("a", None), Duration::from_secs(0)).unwrap();
        controller.process_uplink(&uplink("b", None), Duration::from_secs(100)).unwrap();
        controller.process_uplink(&uplink("a", None), Duration::from_secs(200)).unwrap();

        let status = controller.status(Duration::from_secs(350));
        assert_eq!(status.window.count, 2);
        assert_eq!(status.window.active_participants, 2);
        assert_eq!(status.lifetime_uplinks, 3);
        assert_eq!(status.known_participants, 2);
        assert_eq!(controller.lifetime_uplinks("a"), 2);
        assert!(status.to_string().contains("msgs=2/10"));
    }
}
