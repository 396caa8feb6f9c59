//! Mission state machine that fuses GPS waypoint navigation with predictive visual tracking.
//!
//! [`NavigationMachine`] is fed one [`TickSnapshot`] per control period plus mission control
//! messages as they arrive. Each tick yields exactly one [`StickCommand`] and any number of
//! [`NavigationEvent`]s. Time only enters through the snapshot, so a recorded sequence of inputs
//! replays identically.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::StateMachine;
use crate::config::NavigatorConfig;
use crate::geo::error::InvalidLocationData;
use crate::geo::{self, Position, RouteUpdate, Waypoint};
use crate::slot::Stamped;
use crate::stick::{self, StickCommand};
use crate::tracking::{self, TrackingDelta, TrackingSample, TrackingUpdate};

/// A position fix from the location source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub position: Position,
    /// Compass heading in degrees, 0 = North. `None` when the source does not report one.
    pub heading_deg: Option<f64>,
    /// Source clock. Fixes older than the last accepted one are dropped.
    pub timestamp_ms: i64,
}

/// Mission control message. `start == false` is an explicit stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissionControl {
    pub start: bool,
    pub destination: Position,
}

impl MissionControl {
    pub fn start(destination: Position) -> Self {
        Self {
            start: true,
            destination,
        }
    }

    pub fn stop() -> Self {
        Self {
            start: false,
            destination: Position::new(f64::NAN, f64::NAN, f64::NAN),
        }
    }
}

/// Everything the machine may look at during one control tick, read once at tick start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSnapshot {
    pub now: Instant,
    pub gps: Option<Stamped<GpsFix>>,
    pub tracking: Option<Stamped<TrackingUpdate>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavigationState {
    Idle,
    EnRoute(Waypoint),
    Arrived,
    Aborted(AbortReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Explicit stop or controller shutdown.
    Stopped,
    /// Neither GPS nor tracking delivered fresh input within their timeouts.
    StaleInput,
}

/// The input channels whose freshness is monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Gps,
    Tracking,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Gps => f.write_str("GPS"),
            Channel::Tracking => f.write_str("tracking"),
        }
    }
}

/// Indicates that a channel delivered nothing fresh within its timeout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no fresh {channel} input within {timeout:?}")]
pub struct StaleInput {
    pub channel: Channel,
    pub timeout: Duration,
}

/// Conditions reported upstream without necessarily ending the mission.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NavigationFault {
    #[error(transparent)]
    InvalidLocationData(#[from] InvalidLocationData),

    #[error(transparent)]
    StaleInput(#[from] StaleInput),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationEvent {
    RouteUpdate(RouteUpdate),
    Arrived,
    Aborted(AbortReason),
    Fault(NavigationFault),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NavigationInput {
    Mission(MissionControl),
    Tick(TickSnapshot),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutput {
    Command(StickCommand),
    Event(NavigationEvent),
}

/// The vehicle as last observed by the machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub position: Option<Position>,
    pub heading_deg: Option<f64>,
    pub last_fix_at: Option<Instant>,
    pub last_command: StickCommand,
}

pub struct NavigationMachine {
    config: NavigatorConfig,
    state: NavigationState,
    vehicle: VehicleState,

    pending_start: Option<Position>,
    last_gps_stamp: Option<Instant>,
    last_fix_timestamp_ms: Option<i64>,

    last_tracking_stamp: Option<Instant>,
    previous_sample: Option<TrackingSample>,
    visual: Option<TrackingDelta>,

    tracking_seen: bool,
    tracking_stale_reported: bool,
    gps_degraded_since: Option<Instant>,

    pending_command: Option<StickCommand>,
    pending_events: VecDeque<NavigationEvent>,
}

impl NavigationMachine {
    pub fn new(config: NavigatorConfig) -> Self {
        let neutral = StickCommand::neutral(config.max_stick_value);

        Self {
            config,
            state: NavigationState::Idle,
            vehicle: VehicleState {
                position: None,
                heading_deg: None,
                last_fix_at: None,
                last_command: neutral,
            },
            pending_start: None,
            last_gps_stamp: None,
            last_fix_timestamp_ms: None,
            last_tracking_stamp: None,
            previous_sample: None,
            visual: None,
            tracking_seen: false,
            tracking_stale_reported: false,
            gps_degraded_since: None,
            pending_command: None,
            pending_events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn vehicle(&self) -> &VehicleState {
        &self.vehicle
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    fn neutral(&self) -> StickCommand {
        StickCommand::neutral(self.config.max_stick_value)
    }

    fn handle_mission(&mut self, mission: MissionControl) {
        if mission.start {
            // Evaluated against the next tick's snapshot
            self.pending_start = Some(mission.destination);
            return;
        }

        self.pending_start = None;
        match self.state {
            NavigationState::EnRoute(_) => {
                self.transition(NavigationState::Aborted(AbortReason::Stopped));
                self.publish(self.neutral());
                self.emit(NavigationEvent::Aborted(AbortReason::Stopped));
            }
            NavigationState::Idle | NavigationState::Arrived | NavigationState::Aborted(_) => {
                self.publish(self.neutral());
            }
        }
    }

    fn tick(&mut self, snapshot: TickSnapshot) {
        let now = snapshot.now;

        self.absorb_gps(snapshot.gps);
        self.absorb_tracking(snapshot.tracking);

        if let Some(destination) = self.pending_start.take() {
            self.start_mission(destination, now);
        }

        let command = match self.state {
            NavigationState::EnRoute(waypoint) => self.navigate(now, waypoint),
            NavigationState::Idle | NavigationState::Arrived | NavigationState::Aborted(_) => {
                self.neutral()
            }
        };

        self.publish(command);
    }

    fn absorb_gps(&mut self, gps: Option<Stamped<GpsFix>>) {
        let Some(stamped) = gps else {
            return;
        };
        if self.last_gps_stamp == Some(stamped.received_at) {
            return;
        }
        self.last_gps_stamp = Some(stamped.received_at);

        let fix = stamped.value;
        let destination = match self.state {
            NavigationState::EnRoute(waypoint) => Some(waypoint),
            NavigationState::Idle | NavigationState::Arrived | NavigationState::Aborted(_) => None,
        };

        if !fix.position.is_valid() {
            warn!(position = ?fix.position, "Discarding invalid GPS fix");
            self.emit_fault(InvalidLocationData {
                current: Some(fix.position),
                destination: destination.map(|waypoint| waypoint.destination),
            });
            return;
        }

        if self
            .last_fix_timestamp_ms
            .is_some_and(|last| fix.timestamp_ms < last)
        {
            debug!(
                timestamp_ms = fix.timestamp_ms,
                last_timestamp_ms = ?self.last_fix_timestamp_ms,
                "Dropping out-of-order GPS fix"
            );
            return;
        }
        self.last_fix_timestamp_ms = Some(fix.timestamp_ms);

        self.vehicle.position = Some(fix.position);
        self.vehicle.heading_deg = fix.heading_deg.filter(|heading| heading.is_finite());
        self.vehicle.last_fix_at = Some(stamped.received_at);

        if let Some(update) =
            destination.and_then(|waypoint| geo::process(&fix.position, &waypoint, true))
        {
            self.emit(NavigationEvent::RouteUpdate(update));
        }
    }

    fn absorb_tracking(&mut self, tracking: Option<Stamped<TrackingUpdate>>) {
        let Some(stamped) = tracking else {
            return;
        };
        if self.last_tracking_stamp == Some(stamped.received_at) {
            return;
        }
        let gap_exceeded = self.last_tracking_stamp.is_some_and(|last| {
            stamped.received_at.saturating_duration_since(last)
                > self.config.tracking_stale_timeout()
        });
        self.last_tracking_stamp = Some(stamped.received_at);

        // A pair spanning a stale gap says nothing about the current target motion
        if gap_exceeded && self.previous_sample.take().is_some() {
            debug!("Tracking gap exceeded timeout, dropping previous tracking sample");
            self.visual = None;
        }

        let update = stamped.value;
        if !update.locked {
            if self.previous_sample.take().is_some() {
                debug!("Target lock lost, dropping previous tracking sample");
            }
            self.visual = None;
            return;
        }

        if let Some(previous) = self.previous_sample.replace(update.sample) {
            let delta = tracking::compute_delta(
                &previous,
                &update.sample,
                self.config.compensation_delay_ms,
            );
            self.visual = Some(delta);
        }
    }

    fn start_mission(&mut self, destination: Position, now: Instant) {
        let current = self.vehicle.position;

        match current {
            Some(position) if geo::validate(&position, &destination) => {
                let waypoint = Waypoint::new(destination, self.config.altitude_setpoint_m);

                self.transition(NavigationState::EnRoute(waypoint));
                self.tracking_seen = false;
                self.tracking_stale_reported = false;
                if !self.tracking_fresh(now) {
                    self.previous_sample = None;
                    self.visual = None;
                }
                self.gps_degraded_since = None;

                if let Some(update) = geo::process(&position, &waypoint, true) {
                    self.emit(NavigationEvent::RouteUpdate(update));
                }
            }
            _ => {
                warn!(current = ?current, destination = ?destination, "Rejecting mission start");
                self.emit_fault(InvalidLocationData {
                    current,
                    destination: Some(destination),
                });
            }
        }
    }

    fn navigate(&mut self, now: Instant, waypoint: Waypoint) -> StickCommand {
        let gps_fresh = self
            .vehicle
            .last_fix_at
            .is_some_and(|at| Stamped::new((), at).is_fresh(now, self.config.gps_stale_timeout()));
        let tracking_fresh = self.tracking_fresh(now);

        if tracking_fresh {
            self.tracking_seen = true;
            self.tracking_stale_reported = false;
        }

        match (gps_fresh, tracking_fresh) {
            (false, false) => {
                warn!("GPS and tracking both stale, aborting mission");
                self.transition(NavigationState::Aborted(AbortReason::StaleInput));
                self.emit(NavigationEvent::Aborted(AbortReason::StaleInput));
                return self.neutral();
            }
            (false, true) => return self.degraded(now),
            (true, _) => {}
        }

        if self.gps_degraded_since.take().is_some() {
            info!("GPS input recovered");
        }

        if !tracking_fresh {
            self.visual = None;
            self.previous_sample = None;
            if self.tracking_seen && !self.tracking_stale_reported {
                warn!("Tracking input stale, navigating on GPS only");
                self.tracking_stale_reported = true;
                self.emit_fault(StaleInput {
                    channel: Channel::Tracking,
                    timeout: self.config.tracking_stale_timeout(),
                });
            }
        }

        let Some(current) = self.vehicle.position else {
            return self.neutral();
        };

        if geo::is_arrived(&current, &waypoint.destination, self.config.arrival_threshold_deg) {
            info!(position = ?current, "Arrived at destination");
            self.transition(NavigationState::Arrived);
            self.emit(NavigationEvent::Arrived);
            return self.neutral();
        }

        self.correction(&current, &waypoint)
    }

    fn tracking_fresh(&self, now: Instant) -> bool {
        let timeout = self.config.tracking_stale_timeout();
        self.last_tracking_stamp
            .is_some_and(|at| Stamped::new((), at).is_fresh(now, timeout))
    }

    /// Hold the last command for a short while after GPS goes stale, then center the stick.
    fn degraded(&mut self, now: Instant) -> StickCommand {
        let since = match self.gps_degraded_since {
            Some(since) => since,
            None => {
                warn!("GPS input stale, holding last command");
                self.gps_degraded_since = Some(now);
                self.emit_fault(StaleInput {
                    channel: Channel::Gps,
                    timeout: self.config.gps_stale_timeout(),
                });
                now
            }
        };

        if now.saturating_duration_since(since) < self.config.stale_hold() {
            self.vehicle.last_command
        } else {
            self.neutral()
        }
    }

    /// Blend the heading correction toward the waypoint with the predicted visual offset.
    fn correction(&self, current: &Position, waypoint: &Waypoint) -> StickCommand {
        let course = geo::distance_and_bearing(current, &waypoint.destination);
        let heading_error = self
            .vehicle
            .heading_deg
            .map(|heading| geo::heading_error(course.bearing_deg, heading));

        let visual_deg = self
            .visual
            .map(|delta| delta.future_offset_x * self.config.camera_half_fov_deg);
        let weight = match visual_deg {
            Some(_) => self.visual_weight(course.distance_m),
            None => 0.0,
        };

        let navigational_deg = heading_error.unwrap_or(0.0);
        let horizontal_deg = match visual_deg {
            Some(visual_deg) => weight * visual_deg + (1.0 - weight) * navigational_deg,
            None => navigational_deg,
        };

        let aligned = weight >= 1.0
            || heading_error.is_some_and(|error| error.abs() <= self.config.heading_tolerance_deg);
        let forward_mps = if aligned {
            self.approach_velocity(course.distance_m)
        } else {
            0.0
        };

        let command = stick::build_scaled_command(
            forward_mps,
            self.config.velocity_gain,
            horizontal_deg,
            self.config.degree_gain,
            self.config.max_stick_value,
        );

        debug!(
            distance_m = course.distance_m,
            bearing = course.bearing_deg,
            heading_error = ?heading_error,
            altitude_error = ?geo::altitude_error(current, waypoint),
            visual_weight = weight,
            vertical = command.vertical(),
            horizontal = command.horizontal(),
            "Computed correction"
        );

        command
    }

    /// Weight of the visual correction: 1 inside the full range, 0 beyond the fade range.
    fn visual_weight(&self, distance_m: f64) -> f64 {
        let full = self.config.visual_full_range_m;
        let fade = self.config.visual_fade_range_m;

        if distance_m <= full {
            1.0
        } else if distance_m >= fade {
            0.0
        } else {
            (fade - distance_m) / (fade - full)
        }
    }

    fn approach_velocity(&self, distance_m: f64) -> f64 {
        let approach = self.config.approach_distance_m;
        if approach <= 0.0 || distance_m >= approach {
            self.config.cruise_velocity_mps
        } else {
            self.config.cruise_velocity_mps * distance_m / approach
        }
    }

    fn transition(&mut self, next: NavigationState) {
        info!(from = ?self.state, to = ?next, "Navigation state changed");
        self.state = next;
    }

    fn publish(&mut self, command: StickCommand) {
        self.vehicle.last_command = command;
        self.pending_command = Some(command);
    }

    fn emit(&mut self, event: NavigationEvent) {
        self.pending_events.push_back(event);
    }

    fn emit_fault(&mut self, fault: impl Into<NavigationFault>) {
        self.emit(NavigationEvent::Fault(fault.into()));
    }

    fn poll_command(&mut self) -> Option<StickCommand> {
        self.pending_command.take()
    }

    fn poll_event(&mut self) -> Option<NavigationEvent> {
        self.pending_events.pop_front()
    }
}

impl StateMachine for NavigationMachine {
    type Input = NavigationInput;
    type Output = NavigationOutput;

    fn process_input(&mut self, input: Self::Input) {
        match input {
            NavigationInput::Mission(mission) => self.handle_mission(mission),
            NavigationInput::Tick(snapshot) => self.tick(snapshot),
        }
    }

    /// The command is always handed out before the events of the same tick, so a neutral stick is
    /// in place before an abort or arrival is surfaced.
    fn poll_output(&mut self) -> Option<Self::Output> {
        if let Some(output) = self.poll_command().map(NavigationOutput::Command) {
            return Some(output);
        }

        self.poll_event().map(NavigationOutput::Event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEST: (f64, f64) = (37.1000, 127.1000);

    fn config() -> NavigatorConfig {
        NavigatorConfig::builder()
            .gps_stale_timeout_ms(3000)
            .tracking_stale_timeout_ms(1000)
            .stale_hold_ms(500)
            .build()
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn fix(lat: f64, lng: f64, heading: f64, at: Instant) -> Option<Stamped<GpsFix>> {
        Some(Stamped::new(
            GpsFix {
                position: Position::new(lat, lng, 5.0),
                heading_deg: Some(heading),
                timestamp_ms: 0,
            },
            at,
        ))
    }

    fn fix_with(
        lat: f64,
        altitude: f64,
        timestamp_ms: i64,
        at: Instant,
    ) -> Option<Stamped<GpsFix>> {
        Some(Stamped::new(
            GpsFix {
                position: Position::new(lat, DEST.1, altitude),
                heading_deg: Some(0.0),
                timestamp_ms,
            },
            at,
        ))
    }

    fn track(
        offset_x: f64,
        timestamp_ms: i64,
        locked: bool,
        at: Instant,
    ) -> Option<Stamped<TrackingUpdate>> {
        Some(Stamped::new(
            TrackingUpdate {
                sample: TrackingSample {
                    timestamp_ms,
                    box_width: 100.0,
                    box_height: 200.0,
                    offset_x,
                    offset_y: 0.0,
                },
                locked,
            },
            at,
        ))
    }

    fn destination() -> Position {
        Position::new(DEST.0, DEST.1, 0.0)
    }

    fn tick(
        machine: &mut NavigationMachine,
        now: Instant,
        gps: Option<Stamped<GpsFix>>,
        tracking: Option<Stamped<TrackingUpdate>>,
    ) -> (Vec<StickCommand>, Vec<NavigationEvent>) {
        machine.process_input(NavigationInput::Tick(TickSnapshot { now, gps, tracking }));
        drain(machine)
    }

    fn drain(machine: &mut NavigationMachine) -> (Vec<StickCommand>, Vec<NavigationEvent>) {
        let mut commands = Vec::new();
        let mut events = Vec::new();
        while let Some(output) = machine.poll_output() {
            match output {
                NavigationOutput::Command(command) => commands.push(command),
                NavigationOutput::Event(event) => events.push(event),
            }
        }
        (commands, events)
    }

    fn start(machine: &mut NavigationMachine, destination: Position) {
        machine.process_input(NavigationInput::Mission(MissionControl::start(destination)));
    }

    /// Starts a mission ~111 m south of the destination, facing north.
    fn en_route(t0: Instant) -> NavigationMachine {
        let mut machine = NavigationMachine::new(config());
        start(&mut machine, destination());
        tick(&mut machine, t0, fix(DEST.0 - 0.001, DEST.1, 0.0, t0), None);
        assert!(matches!(machine.state(), NavigationState::EnRoute(_)));
        machine
    }

    #[test]
    fn test_idle_publishes_neutral() {
        let mut machine = NavigationMachine::new(config());
        let (commands, events) = tick(&mut machine, Instant::now(), None, None);

        assert_eq!(commands.len(), 1);
        assert!(commands[0].is_neutral());
        assert!(events.is_empty());
        assert_eq!(machine.state(), NavigationState::Idle);
    }

    #[test]
    fn test_start_with_nan_destination_stays_idle() {
        let t0 = Instant::now();
        let mut machine = NavigationMachine::new(config());

        start(&mut machine, Position::new(f64::NAN, 127.1, 0.0));
        let (commands, events) = tick(&mut machine, t0, fix(37.0, 127.0, 0.0, t0), None);

        assert_eq!(machine.state(), NavigationState::Idle);
        assert!(commands[0].is_neutral());
        assert!(matches!(
            events.as_slice(),
            [NavigationEvent::Fault(NavigationFault::InvalidLocationData(_))]
        ));
    }

    #[test]
    fn test_start_without_position_is_rejected() {
        let mut machine = NavigationMachine::new(config());

        start(&mut machine, destination());
        let (_, events) = tick(&mut machine, Instant::now(), None, None);

        assert_eq!(machine.state(), NavigationState::Idle);
        assert!(matches!(
            events.as_slice(),
            [NavigationEvent::Fault(NavigationFault::InvalidLocationData(InvalidLocationData {
                current: None,
                ..
            }))]
        ));
    }

    #[test]
    fn test_arrival_on_start() {
        let t0 = Instant::now();
        let mut machine = NavigationMachine::new(config());

        start(&mut machine, destination());
        let nearly_there = fix(37.0999999, 127.1000001, 0.0, t0);
        let (commands, events) = tick(&mut machine, t0, nearly_there, None);

        assert_eq!(machine.state(), NavigationState::Arrived);
        assert_eq!(commands, vec![StickCommand::neutral(660)]);
        assert!(matches!(
            events.as_slice(),
            [NavigationEvent::RouteUpdate(_), NavigationEvent::Arrived]
        ));
    }

    #[test]
    fn test_arrival_while_en_route() {
        let t0 = Instant::now();
        let mut machine = en_route(t0);

        let t1 = t0 + ms(100);
        let nearly_there = fix(37.0999999, 127.1000001, 0.0, t1);
        let (commands, events) = tick(&mut machine, t1, nearly_there, None);

        assert_eq!(machine.state(), NavigationState::Arrived);
        assert!(commands[0].is_neutral());
        assert_eq!(events.last(), Some(&NavigationEvent::Arrived));

        // Stays neutral afterwards
        let (commands, _) = tick(&mut machine, t1 + ms(100), None, None);
        assert!(commands[0].is_neutral());
    }

    #[test]
    fn test_heads_toward_destination_at_cruise() {
        let t0 = Instant::now();
        let mut machine = en_route(t0);

        let (commands, _) = tick(&mut machine, t0 + ms(100), None, None);

        // 5 m/s * 66
        assert_eq!(commands[0].vertical(), 330);
        assert_eq!(commands[0].horizontal(), 0);
    }

    #[test]
    fn test_turns_before_advancing() {
        let t0 = Instant::now();
        let mut machine = NavigationMachine::new(config());
        start(&mut machine, destination());
        // Facing east while the destination is due north
        let (commands, _) = tick(&mut machine, t0, fix(DEST.0 - 0.001, DEST.1, 90.0, t0), None);

        assert_eq!(commands[0].vertical(), 0);
        assert_eq!(commands[0].horizontal(), -180);
    }

    #[test]
    fn test_unknown_heading_does_not_advance() {
        let t0 = Instant::now();
        let mut machine = NavigationMachine::new(config());
        start(&mut machine, destination());

        let gps = Some(Stamped::new(
            GpsFix {
                position: Position::new(DEST.0 - 0.001, DEST.1, 5.0),
                heading_deg: None,
                timestamp_ms: 0,
            },
            t0,
        ));
        let (commands, _) = tick(&mut machine, t0, gps, None);

        assert!(commands[0].is_neutral());
    }

    #[test]
    fn test_visual_correction_dominates_at_short_range() {
        let t0 = Instant::now();
        let mut machine = NavigationMachine::new(config());
        start(&mut machine, destination());

        // ~5.6 m south of the destination, outside the arrival threshold
        let near = DEST.0 - 0.00005;
        tick(&mut machine, t0, fix(near, DEST.1, 0.0, t0), track(0.0, 0, true, t0));

        let t1 = t0 + ms(1000);
        let (commands, _) = tick(
            &mut machine,
            t1,
            fix(near, DEST.1, 0.0, t1),
            track(0.2, 1000, true, t1),
        );

        // future offset 0.24 * 35 deg * gain 2.0 = 16.8
        assert_eq!(commands[0].horizontal(), 17);
        assert!(commands[0].vertical() > 0);
    }

    #[test]
    fn test_visual_correction_ignored_at_long_range() {
        let t0 = Instant::now();
        let mut machine = en_route(t0);

        tick(&mut machine, t0 + ms(100), None, track(0.0, 0, true, t0 + ms(100)));
        let t2 = t0 + ms(200);
        let (commands, _) = tick(&mut machine, t2, None, track(0.5, 100, true, t2));

        assert_eq!(commands[0].horizontal(), 0);
        assert_eq!(commands[0].vertical(), 330);
    }

    #[test]
    fn test_lock_loss_discards_previous_sample() {
        let t0 = Instant::now();
        let mut machine = NavigationMachine::new(config());
        start(&mut machine, destination());
        let near = DEST.0 - 0.00005;
        tick(&mut machine, t0, fix(near, DEST.1, 0.0, t0), track(0.0, 0, true, t0));

        let t1 = t0 + ms(100);
        tick(&mut machine, t1, None, track(0.9, 100, false, t1));

        // First locked sample after re-acquisition has nothing to pair with
        let t2 = t0 + ms(200);
        let (commands, _) = tick(&mut machine, t2, None, track(0.5, 200, true, t2));
        assert_eq!(commands[0].horizontal(), 0);

        let t3 = t0 + ms(300);
        let (commands, _) = tick(&mut machine, t3, None, track(0.5, 300, true, t3));
        // offset 0.5, no drift: 0.5 * 35 * 2 = 35
        assert_eq!(commands[0].horizontal(), 35);
    }

    #[test]
    fn test_tracking_pair_not_formed_across_stale_gap() {
        let t0 = Instant::now();
        let mut machine = NavigationMachine::new(config());
        start(&mut machine, destination());
        let near = DEST.0 - 0.00005;
        tick(&mut machine, t0, fix(near, DEST.1, 0.0, t0), track(0.0, 0, true, t0));

        // GPS stays fresh, tracking goes silent for longer than its timeout
        for elapsed in [2000, 4000] {
            let at = t0 + ms(elapsed);
            tick(&mut machine, at, fix(near, DEST.1, 0.0, at), None);
        }

        let t1 = t0 + ms(5000);
        let (commands, _) =
            tick(&mut machine, t1, fix(near, DEST.1, 0.0, t1), track(0.5, 5000, true, t1));
        assert_eq!(commands[0].horizontal(), 0);

        let t2 = t0 + ms(5100);
        let (commands, _) = tick(&mut machine, t2, None, track(0.5, 5100, true, t2));
        assert_eq!(commands[0].horizontal(), 35);
    }

    #[test]
    fn test_tracking_gap_between_consecutive_samples_drops_pair() {
        let t0 = Instant::now();
        let mut machine = NavigationMachine::new(config());
        start(&mut machine, destination());
        let near = DEST.0 - 0.00005;
        tick(&mut machine, t0, fix(near, DEST.1, 0.0, t0), track(0.0, 0, true, t0));

        // No tick in between: the gap is only visible from the receive stamps
        let t1 = t0 + ms(2500);
        let (commands, _) =
            tick(&mut machine, t1, fix(near, DEST.1, 0.0, t1), track(0.5, 2500, true, t1));
        assert_eq!(commands[0].horizontal(), 0);
    }

    #[test]
    fn test_stale_sample_does_not_carry_into_next_mission() {
        let t0 = Instant::now();
        let mut machine = NavigationMachine::new(config());
        let near = DEST.0 - 0.00005;
        tick(&mut machine, t0, fix(near, DEST.1, 0.0, t0), track(0.0, 0, true, t0));

        let t1 = t0 + ms(3000);
        start(&mut machine, destination());
        tick(&mut machine, t1, fix(near, DEST.1, 0.0, t1), None);

        let t2 = t0 + ms(3100);
        let (commands, _) = tick(&mut machine, t2, None, track(0.5, 3100, true, t2));
        assert_eq!(commands[0].horizontal(), 0);
    }

    #[test]
    fn test_route_update_reports_altitude_error() {
        let t0 = Instant::now();
        let mut errors = Vec::new();

        for altitude in [5.0, 80.0] {
            let mut machine = NavigationMachine::new(config());
            start(&mut machine, destination());
            let gps = fix_with(DEST.0 - 0.001, altitude, 0, t0);
            let (_, events) = tick(&mut machine, t0, gps, None);
            match events.as_slice() {
                [NavigationEvent::RouteUpdate(update)] => errors.push(update.altitude_error_m),
                other => panic!("unexpected events: {other:?}"),
            }
        }

        assert_eq!(errors, vec![Some(0.0), Some(-75.0)]);
    }

    #[test]
    fn test_out_of_order_fix_is_dropped() {
        let t0 = Instant::now();
        let mut machine = en_route(t0);

        let t1 = t0 + ms(100);
        tick(&mut machine, t1, fix_with(DEST.0 - 0.0009, 5.0, 2000, t1), None);
        let accepted = machine.vehicle().position;

        let t2 = t0 + ms(200);
        let (commands, events) =
            tick(&mut machine, t2, fix_with(DEST.0 - 0.0005, 5.0, 1000, t2), None);

        assert_eq!(machine.vehicle().position, accepted);
        assert_eq!(machine.vehicle().last_fix_at, Some(t1));
        assert_eq!(commands.len(), 1);
        assert!(events.is_empty());
    }

    #[test]
    fn test_invalid_fix_is_discarded() {
        let t0 = Instant::now();
        let mut machine = en_route(t0);
        let before = machine.vehicle().position;

        let t1 = t0 + ms(100);
        let (commands, events) = tick(&mut machine, t1, fix(f64::NAN, DEST.1, 0.0, t1), None);

        assert!(matches!(machine.state(), NavigationState::EnRoute(_)));
        assert_eq!(machine.vehicle().position, before);
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            events.as_slice(),
            [NavigationEvent::Fault(NavigationFault::InvalidLocationData(InvalidLocationData {
                destination: Some(_),
                ..
            }))]
        ));
    }

    #[test]
    fn test_same_snapshot_is_absorbed_once() {
        let t0 = Instant::now();
        let mut machine = en_route(t0);

        let t1 = t0 + ms(100);
        let gps = fix(DEST.0 - 0.0009, DEST.1, 0.0, t1);
        let (_, events) = tick(&mut machine, t1, gps, None);
        assert!(matches!(events.as_slice(), [NavigationEvent::RouteUpdate(_)]));

        let (_, events) = tick(&mut machine, t1 + ms(100), gps, None);
        assert!(events.is_empty());
    }

    #[test]
    fn test_gps_stale_with_fresh_tracking_holds_then_neutral() {
        let t0 = Instant::now();
        let mut machine = en_route(t0);

        let t1 = t0 + ms(100);
        let (commands, _) = tick(&mut machine, t1, None, track(0.0, 100, true, t1));
        let cruising = commands[0];
        assert!(!cruising.is_neutral());

        // GPS fix from t0 is stale after 3000 ms, tracking keeps arriving
        let t_stale = t0 + ms(3100);
        let (commands, events) = tick(&mut machine, t_stale, None, track(0.0, 3100, true, t_stale));
        assert_eq!(commands[0], cruising);
        assert!(matches!(
            events.as_slice(),
            [NavigationEvent::Fault(NavigationFault::StaleInput(StaleInput {
                channel: Channel::Gps,
                ..
            }))]
        ));

        let t_hold = t0 + ms(3400);
        let (commands, events) = tick(&mut machine, t_hold, None, track(0.0, 3400, true, t_hold));
        assert_eq!(commands[0], cruising);
        assert!(events.is_empty());

        let t_neutral = t0 + ms(3700);
        let (commands, _) = tick(&mut machine, t_neutral, None, track(0.0, 3700, true, t_neutral));
        assert!(commands[0].is_neutral());
        assert!(matches!(machine.state(), NavigationState::EnRoute(_)));

        // Recovery resumes navigation
        let t_back = t0 + ms(3800);
        let (commands, _) = tick(
            &mut machine,
            t_back,
            fix(DEST.0 - 0.001, DEST.1, 0.0, t_back),
            track(0.0, 3800, true, t_back),
        );
        assert_eq!(commands[0], cruising);
    }

    #[test]
    fn test_both_stale_aborts_with_neutral_first() {
        let t0 = Instant::now();
        let mut machine = en_route(t0);

        machine.process_input(NavigationInput::Tick(TickSnapshot {
            now: t0 + ms(3100),
            gps: None,
            tracking: None,
        }));

        assert!(matches!(
            machine.poll_output(),
            Some(NavigationOutput::Command(command)) if command.is_neutral()
        ));
        assert_eq!(
            machine.poll_output(),
            Some(NavigationOutput::Event(NavigationEvent::Aborted(AbortReason::StaleInput)))
        );
        assert!(machine.poll_output().is_none());
        assert_eq!(machine.state(), NavigationState::Aborted(AbortReason::StaleInput));
    }

    #[test]
    fn test_tracking_stale_reported_once() {
        let t0 = Instant::now();
        let mut machine = en_route(t0);

        tick(&mut machine, t0 + ms(100), None, track(0.0, 100, true, t0 + ms(100)));

        let (commands, events) = tick(&mut machine, t0 + ms(1200), None, None);
        assert_eq!(commands[0].vertical(), 330);
        assert!(matches!(
            events.as_slice(),
            [NavigationEvent::Fault(NavigationFault::StaleInput(StaleInput {
                channel: Channel::Tracking,
                ..
            }))]
        ));

        let (_, events) = tick(&mut machine, t0 + ms(1300), None, None);
        assert!(events.is_empty());
    }

    #[test]
    fn test_stop_aborts_and_restart_resumes() {
        let t0 = Instant::now();
        let mut machine = en_route(t0);
        tick(&mut machine, t0 + ms(100), None, None);

        machine.process_input(NavigationInput::Mission(MissionControl::stop()));
        let (commands, events) = drain(&mut machine);
        assert!(commands[0].is_neutral());
        assert_eq!(events, vec![NavigationEvent::Aborted(AbortReason::Stopped)]);
        assert_eq!(machine.state(), NavigationState::Aborted(AbortReason::Stopped));

        start(&mut machine, destination());
        let t1 = t0 + ms(200);
        let (commands, events) = tick(&mut machine, t1, fix(DEST.0 - 0.001, DEST.1, 0.0, t1), None);
        assert!(matches!(machine.state(), NavigationState::EnRoute(_)));
        assert!(matches!(events.as_slice(), [NavigationEvent::RouteUpdate(_)]));
        assert_eq!(commands[0].vertical(), 330);
    }

    #[test]
    fn test_stop_when_idle_only_centers_stick() {
        let mut machine = NavigationMachine::new(config());
        machine.process_input(NavigationInput::Mission(MissionControl::stop()));

        let (commands, events) = drain(&mut machine);
        assert!(commands[0].is_neutral());
        assert!(events.is_empty());
        assert_eq!(machine.state(), NavigationState::Idle);
    }

    #[test]
    fn test_commands_never_exceed_limit() {
        let t0 = Instant::now();
        let config = NavigatorConfig::builder()
            .velocity_gain(1e6)
            .degree_gain(1e6)
            .build();
        let mut machine = NavigationMachine::new(config);
        start(&mut machine, destination());

        for (i, heading) in [0.0, 45.0, 179.0, 181.0, 270.0, 359.0].into_iter().enumerate() {
            let at = t0 + ms(100 * i as u64);
            let (commands, _) = tick(
                &mut machine,
                at,
                fix(DEST.0 - 0.00005, DEST.1, heading, at),
                track(0.9, 100 * i as i64, true, at),
            );
            assert!((-660..=660).contains(&commands[0].vertical()));
            assert!((-660..=660).contains(&commands[0].horizontal()));
        }
    }
}
