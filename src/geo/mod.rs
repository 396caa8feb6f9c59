//! Waypoint evaluation against GPS fixes.
//!
//! Every function here is pure: it only looks at the positions it is handed. The navigation
//! state machine decides when to call them and what to do with the answer.

pub mod error;

/// Mean earth radius in meters used by [`distance_and_bearing`].
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic position in degrees with an altitude in meters.
///
/// A NaN latitude or longitude marks the position as invalid. It is never a value to compute with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }

    /// Returns `true` when neither horizontal coordinate is NaN.
    pub fn is_valid(&self) -> bool {
        !(self.latitude.is_nan() || self.longitude.is_nan())
    }
}

/// A destination plus the altitude the vehicle should hold on the way there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub destination: Position,
    pub altitude_setpoint: f64,
}

impl Waypoint {
    pub fn new(destination: Position, altitude_setpoint: f64) -> Self {
        Self {
            destination,
            altitude_setpoint,
        }
    }
}

/// Route information published to telemetry whenever an active mission accepts a fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteUpdate {
    pub current: Position,
    pub destination: Position,
    pub altitude_setpoint: f64,
    /// Climb needed to reach the setpoint, positive = up. `None` while the fix carries no altitude.
    pub altitude_error_m: Option<f64>,
}

/// Great-circle distance and initial bearing from one position to another.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Course {
    pub distance_m: f64,
    /// Bearing in degrees, normalized to [0, 360), 0 = North.
    pub bearing_deg: f64,
}

/// Returns `false` if any of the four horizontal coordinates is NaN.
pub fn validate(current: &Position, destination: &Position) -> bool {
    current.is_valid() && destination.is_valid()
}

/// Arrival test on raw coordinate differences.
///
/// This is a small-angle approximation rather than a ground distance: both the latitude and the
/// longitude difference must be within `threshold_deg`. The default threshold of 0.000027 degrees
/// was tuned against this exact comparison and corresponds to roughly three meters.
pub fn is_arrived(current: &Position, destination: &Position, threshold_deg: f64) -> bool {
    let lat_diff = (current.latitude - destination.latitude).abs();
    let lng_diff = (current.longitude - destination.longitude).abs();

    lat_diff <= threshold_deg && lng_diff <= threshold_deg
}

/// Produce a [`RouteUpdate`] for an active mission.
///
/// Nothing is produced when `start_flag` is unset or when either position fails [`validate`].
pub fn process(current: &Position, waypoint: &Waypoint, start_flag: bool) -> Option<RouteUpdate> {
    if !start_flag || !validate(current, &waypoint.destination) {
        return None;
    }

    Some(RouteUpdate {
        current: *current,
        destination: waypoint.destination,
        altitude_setpoint: waypoint.altitude_setpoint,
        altitude_error_m: altitude_error(current, waypoint),
    })
}

/// Signed altitude deviation from the waypoint's setpoint, positive when the vehicle must climb.
pub fn altitude_error(current: &Position, waypoint: &Waypoint) -> Option<f64> {
    let error = waypoint.altitude_setpoint - current.altitude;
    error.is_finite().then_some(error)
}

/// Haversine distance and initial great-circle bearing from `from` to `to`.
pub fn distance_and_bearing(from: &Position, to: &Position) -> Course {
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lng = (to.longitude - from.longitude).to_radians();
    let from_lat = from.latitude.to_radians();
    let to_lat = to.latitude.to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + from_lat.cos() * to_lat.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    let y = d_lng.sin() * to_lat.cos();
    let x = from_lat.cos() * to_lat.sin() - from_lat.sin() * to_lat.cos() * d_lng.cos();
    let bearing_deg = y.atan2(x).to_degrees().rem_euclid(360.0);

    Course {
        distance_m: EARTH_RADIUS_M * c,
        bearing_deg,
    }
}

/// Signed turn from `heading_deg` to `target_bearing_deg`, wrapped to [-180, 180).
pub fn heading_error(target_bearing_deg: f64, heading_deg: f64) -> f64 {
    (target_bearing_deg - heading_deg + 540.0).rem_euclid(360.0) - 180.0
}
