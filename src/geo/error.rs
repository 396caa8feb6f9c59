//! Error types for waypoint evaluation.

use super::Position;

/// Indicates that a position or destination carried a NaN coordinate and cannot be navigated on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid location data (current: {current:?}, destination: {destination:?})")]
pub struct InvalidLocationData {
    pub current: Option<Position>,
    pub destination: Option<Position>,
}
