use std::time::Duration;

use anyhow::{Context, Result, bail};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tracknav::config::NavigatorConfig;
use tracknav::geo::{self, Position};
use tracknav::navigator::{self, Navigator, NavigatorHandles};
use tracknav::state_machine::navigation::{
    GpsFix, MissionControl, NavigationEvent, NavigationState,
};
use tracknav::stick::StickCommand;
use tracknav::tracking::{TrackingSample, TrackingUpdate};
use tracknav::{MISSION_CHANNEL_CAPACITY, monotonic_ms};

const METERS_PER_DEGREE: f64 = 111_320.0;
const DYNAMICS_STEP: Duration = Duration::from_millis(20);
const GPS_PERIOD: Duration = Duration::from_millis(200);
const TRACKING_PERIOD: Duration = Duration::from_millis(50);
const GPS_JITTER_DEG: f64 = 0.000_003;

/// Ground truth of the simulated vehicle.
#[derive(Debug, Clone, Copy)]
struct Truth {
    position: Position,
    heading_deg: f64,
}

impl Truth {
    /// Integrate one step: the vertical stick is forward speed, the horizontal stick is yaw rate.
    fn step(&mut self, command: &StickCommand, config: &NavigatorConfig, dt: f64) {
        let speed = f64::from(command.vertical()) / config.velocity_gain;
        let yaw_rate = f64::from(command.horizontal()) / config.degree_gain;

        self.heading_deg = (self.heading_deg + yaw_rate * dt).rem_euclid(360.0);

        let heading = self.heading_deg.to_radians();
        let north = speed * heading.cos() * dt;
        let east = speed * heading.sin() * dt;
        self.position.latitude += north / METERS_PER_DEGREE;
        self.position.longitude +=
            east / (METERS_PER_DEGREE * self.position.latitude.to_radians().cos());
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw.parse().with_context(|| format!("invalid {name}: {raw}")),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = NavigatorConfig::default();
    config.validate()?;

    let seed: u64 = env_or("SIM_SEED", rand::random())?;
    let offset_m: f64 = env_or("SIM_OFFSET_M", 80.0)?;
    let timeout = Duration::from_secs(env_or("SIM_TIMEOUT_SECS", 120)?);

    let destination = Position::new(37.5665, 126.978, config.altitude_setpoint_m);
    let mut rng = StdRng::seed_from_u64(seed);
    let start = Truth {
        position: Position::new(
            destination.latitude - offset_m / METERS_PER_DEGREE,
            destination.longitude,
            config.altitude_setpoint_m,
        ),
        heading_deg: rng.random_range(0.0..360.0),
    };

    info!(seed, offset_m, heading = start.heading_deg, "Starting simulation");

    let origin = Instant::now();
    let (handles, inputs) = navigator::channels(MISSION_CHANNEL_CAPACITY);
    let (command_tx, command_rx) = watch::channel(StickCommand::neutral(config.max_stick_value));
    let (event_tx, mut event_rx) = broadcast::channel(64);
    let (truth_tx, truth_rx) = watch::channel(start);

    let NavigatorHandles {
        gps,
        tracking,
        missions,
    } = handles;

    let dynamics_config = config.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(DYNAMICS_STEP);
        let dt = DYNAMICS_STEP.as_secs_f64();
        loop {
            ticker.tick().await;
            let command = *command_rx.borrow();
            truth_tx.send_modify(|truth| truth.step(&command, &dynamics_config, dt));
        }
    });

    let gps_truth = truth_rx.clone();
    tokio::spawn(async move {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
        let mut ticker = tokio::time::interval(GPS_PERIOD);
        loop {
            ticker.tick().await;
            let truth = *gps_truth.borrow();
            let mut position = truth.position;
            position.latitude += rng.random_range(-GPS_JITTER_DEG..GPS_JITTER_DEG);
            position.longitude += rng.random_range(-GPS_JITTER_DEG..GPS_JITTER_DEG);
            gps.publish(GpsFix {
                position,
                heading_deg: Some(truth.heading_deg),
                timestamp_ms: monotonic_ms(origin),
            });
        }
    });

    let tracking_truth = truth_rx.clone();
    let fade_range_m = config.visual_fade_range_m;
    let half_fov_deg = config.camera_half_fov_deg;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TRACKING_PERIOD);
        loop {
            ticker.tick().await;
            let truth = *tracking_truth.borrow();
            let course = geo::distance_and_bearing(&truth.position, &destination);
            let offset_x = geo::heading_error(course.bearing_deg, truth.heading_deg) / half_fov_deg;
            let locked = course.distance_m <= fade_range_m && offset_x.abs() <= 1.0;

            tracking.publish(TrackingUpdate {
                sample: TrackingSample {
                    timestamp_ms: monotonic_ms(origin),
                    box_width: 0.2,
                    box_height: 0.4,
                    offset_x: offset_x.clamp(-1.0, 1.0),
                    offset_y: 0.0,
                },
                locked,
            });
        }
    });

    missions
        .send(MissionControl::start(destination))
        .await
        .context("navigator inputs closed before the mission started")?;

    let log_truth = truth_rx.clone();
    let navigator = Navigator::new(config, inputs, command_tx, event_tx);
    let final_state = navigator
        .run_until(async move {
            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    event = event_rx.recv() => match event {
                        Ok(NavigationEvent::Arrived) => break,
                        Ok(NavigationEvent::Aborted(reason)) => {
                            warn!(reason = ?reason, "Mission aborted");
                            break;
                        }
                        Ok(NavigationEvent::RouteUpdate(update)) => {
                            let truth = *log_truth.borrow();
                            let course =
                                geo::distance_and_bearing(&truth.position, &update.destination);
                            debug!(
                                distance_m = course.distance_m,
                                heading = truth.heading_deg,
                                "Progress"
                            );
                        }
                        Ok(event) => info!(event = ?event, "Navigation event"),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Event consumer lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = &mut deadline => {
                        warn!(timeout = ?timeout, "Simulation timed out");
                        break;
                    }
                }
            }
        })
        .await;

    let truth = *truth_rx.borrow();
    let course = geo::distance_and_bearing(&truth.position, &destination);
    info!(
        state = ?final_state,
        distance_m = course.distance_m,
        elapsed = ?origin.elapsed(),
        "Simulation finished"
    );

    if final_state != NavigationState::Arrived {
        bail!("vehicle did not arrive: {final_state:?}");
    }
    Ok(())
}
