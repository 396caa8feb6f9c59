//! Periodic control task driving the [`NavigationMachine`].
//!
//! The task owns the machine and is the only place that touches it. Producers reach it through
//! [`NavigatorHandles`]: GPS fixes and tracking updates go into single-slot holders, mission control
//! goes through a small bounded channel. Each tick drains mission control without waiting, takes one
//! snapshot of both slots, steps the machine and flushes its output to the sinks.

use std::future::Future;

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use crate::config::NavigatorConfig;
use crate::sink::{CommandSink, EventSink};
use crate::slot::{self, SlotReader, SlotWriter};
use crate::state_machine::StateMachine;
use crate::state_machine::navigation::{
    GpsFix, MissionControl, NavigationInput, NavigationMachine, NavigationOutput,
    NavigationState, TickSnapshot,
};
use crate::state_machine::system::SystemResource;
use crate::tracking::TrackingUpdate;

/// Producer side of the navigator's inputs.
#[derive(Debug)]
pub struct NavigatorHandles {
    pub gps: SlotWriter<GpsFix>,
    pub tracking: SlotWriter<TrackingUpdate>,
    pub missions: mpsc::Sender<MissionControl>,
}

/// Consumer side of the navigator's inputs, handed to [`Navigator::new`].
#[derive(Debug)]
pub struct NavigatorInputs {
    gps: SlotReader<GpsFix>,
    tracking: SlotReader<TrackingUpdate>,
    missions: mpsc::Receiver<MissionControl>,
}

/// Create the input plumbing. `mission_capacity` bounds the number of mission control messages
/// that may arrive between two ticks.
pub fn channels(mission_capacity: usize) -> (NavigatorHandles, NavigatorInputs) {
    let (gps_writer, gps_reader) = slot::slot();
    let (tracking_writer, tracking_reader) = slot::slot();
    let (mission_tx, mission_rx) = mpsc::channel(mission_capacity);

    (
        NavigatorHandles {
            gps: gps_writer,
            tracking: tracking_writer,
            missions: mission_tx,
        },
        NavigatorInputs {
            gps: gps_reader,
            tracking: tracking_reader,
            missions: mission_rx,
        },
    )
}

pub struct Navigator<C, E> {
    machine: NavigationMachine,
    inputs: NavigatorInputs,
    commands: C,
    events: E,
}

impl<C: CommandSink, E: EventSink> Navigator<C, E> {
    pub fn new(config: NavigatorConfig, inputs: NavigatorInputs, commands: C, events: E) -> Self {
        Self {
            machine: NavigationMachine::new(config),
            inputs,
            commands,
            events,
        }
    }

    pub fn state(&self) -> NavigationState {
        self.machine.state()
    }

    /// Run one control period at `now`.
    pub fn tick(&mut self, now: Instant) {
        loop {
            match self.inputs.missions.try_recv() {
                Ok(mission) => {
                    debug!(
                        start = mission.start,
                        destination = ?mission.destination,
                        "Mission control received"
                    );
                    self.machine.process_input(NavigationInput::Mission(mission));
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        let snapshot = TickSnapshot {
            now,
            gps: self.inputs.gps.snapshot(),
            tracking: self.inputs.tracking.snapshot(),
        };
        self.machine.process_input(NavigationInput::Tick(snapshot));
        self.flush();
    }

    /// Stop the mission: always leaves a neutral command at the sink.
    pub fn stop(&mut self) {
        self.machine
            .process_input(NavigationInput::Mission(MissionControl::stop()));
        self.flush();
    }

    fn flush(&mut self) {
        while let Some(output) = self.machine.poll_output() {
            match output {
                NavigationOutput::Command(command) => {
                    trace!(
                        vertical = command.vertical(),
                        horizontal = command.horizontal(),
                        "Publishing stick command"
                    );
                    self.commands.publish(command);
                }
                NavigationOutput::Event(event) => {
                    debug!(event = ?event, "Navigation event");
                    self.events.emit(event);
                }
            }
        }
    }

    /// Tick at the configured interval until `shutdown` resolves, then stop and return the final
    /// state.
    pub async fn run_until<F: Future>(mut self, shutdown: F) -> NavigationState {
        let period = self.machine.config().tick_interval();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(period = ?period, "Navigator running");

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(Instant::generate()),
                _ = &mut shutdown => break,
            }
        }

        self.stop();
        info!(state = ?self.state(), "Navigator stopped");
        self.state()
    }
}
