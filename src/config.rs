use std::time::Duration;

use bon::Builder;
use serde::Deserialize;

use crate::stick::MAX_STICK_VALUE;

/// Tuning and safety parameters for the navigation control loop.
///
/// Durations are kept in integer milliseconds so the struct deserializes from the same JSON the
/// ground station writes; the `*_timeout` style accessors hand out [`Duration`]s.
#[derive(Debug, Clone, PartialEq, Builder, Deserialize)]
#[serde(default)]
pub struct NavigatorConfig {
    /// Symmetric stick deflection limit.
    #[builder(default = MAX_STICK_VALUE)]
    pub max_stick_value: i32,

    /// Arrival tolerance on both the latitude and longitude difference, in degrees.
    #[builder(default = 0.000027)]
    pub arrival_threshold_deg: f64,

    /// Expected delay between image capture and a command taking effect.
    #[builder(default = 200)]
    pub compensation_delay_ms: u64,

    #[builder(default = 3000)]
    pub gps_stale_timeout_ms: u64,

    #[builder(default = 1000)]
    pub tracking_stale_timeout_ms: u64,

    /// How long the last command is held while GPS is stale before falling back to neutral.
    #[builder(default = 500)]
    pub stale_hold_ms: u64,

    #[builder(default = 100)]
    pub tick_interval_ms: u64,

    /// Stick units per m/s of forward velocity.
    #[builder(default = 66.0)]
    pub velocity_gain: f64,

    /// Stick units per degree of heading correction.
    #[builder(default = 2.0)]
    pub degree_gain: f64,

    #[builder(default = 5.0)]
    pub cruise_velocity_mps: f64,

    /// Forward velocity ramps down linearly inside this distance of the waypoint.
    #[builder(default = 20.0)]
    pub approach_distance_m: f64,

    /// Heading error beyond which the vehicle turns in place instead of advancing.
    #[builder(default = 5.0)]
    pub heading_tolerance_deg: f64,

    /// Inside this distance the visual correction fully replaces the navigational one.
    #[builder(default = 10.0)]
    pub visual_full_range_m: f64,

    /// Beyond this distance the visual correction is ignored.
    #[builder(default = 50.0)]
    pub visual_fade_range_m: f64,

    /// Degrees of bearing represented by a normalized image offset of 1.0.
    #[builder(default = 35.0)]
    pub camera_half_fov_deg: f64,

    #[builder(default = 5.0)]
    pub altitude_setpoint_m: f64,
}

/// Indicates a configuration that would break the control loop's range guarantees.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_stick_value must be positive, got {0}")]
    StickLimit(i32),

    #[error("{name} must be a finite non-negative number, got {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("visual_full_range_m ({full}) must not exceed visual_fade_range_m ({fade})")]
    VisualRange { full: f64, fade: f64 },

    #[error("tick_interval_ms must be non-zero")]
    TickInterval,
}

impl NavigatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_stick_value <= 0 {
            return Err(ConfigError::StickLimit(self.max_stick_value));
        }

        if self.tick_interval_ms == 0 {
            return Err(ConfigError::TickInterval);
        }

        let non_negative = [
            ("arrival_threshold_deg", self.arrival_threshold_deg),
            ("velocity_gain", self.velocity_gain),
            ("degree_gain", self.degree_gain),
            ("cruise_velocity_mps", self.cruise_velocity_mps),
            ("approach_distance_m", self.approach_distance_m),
            ("heading_tolerance_deg", self.heading_tolerance_deg),
            ("visual_full_range_m", self.visual_full_range_m),
            ("visual_fade_range_m", self.visual_fade_range_m),
            ("camera_half_fov_deg", self.camera_half_fov_deg),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Negative { name, value });
            }
        }

        if self.visual_full_range_m > self.visual_fade_range_m {
            return Err(ConfigError::VisualRange {
                full: self.visual_full_range_m,
                fade: self.visual_fade_range_m,
            });
        }

        Ok(())
    }

    pub fn gps_stale_timeout(&self) -> Duration {
        Duration::from_millis(self.gps_stale_timeout_ms)
    }

    pub fn tracking_stale_timeout(&self) -> Duration {
        Duration::from_millis(self.tracking_stale_timeout_ms)
    }

    pub fn stale_hold(&self) -> Duration {
        Duration::from_millis(self.stale_hold_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
