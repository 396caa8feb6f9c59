pub mod config;
pub mod geo;
pub mod navigator;
pub mod sink;
pub mod slot;
pub mod state_machine;
pub mod stick;
pub mod tracking;
pub mod wire;

use tokio::time::Instant;

/// UDP port of the route producer (start trigger, current and destination location).
pub const ROUTE_PORT: u16 = 23456;

/// UDP port of the perception producer (one detection per datagram).
pub const TRACKING_PORT: u16 = 11435;

/// Capacity of the mission control channel between two control ticks.
pub const MISSION_CHANNEL_CAPACITY: usize = 8;

/// Milliseconds elapsed since `origin` on the monotonic clock.
///
/// Producers stamp samples with this so that tracking deltas never see wall-clock jumps.
pub fn monotonic_ms(origin: Instant) -> i64 {
    i64::try_from(origin.elapsed().as_millis()).unwrap_or(i64::MAX)
}
