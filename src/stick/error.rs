//! Error types for actuation commands.

use std::fmt;

/// The two axes of a [`StickCommand`](super::StickCommand).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Vertical,
    Horizontal,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Vertical => f.write_str("vertical"),
            Axis::Horizontal => f.write_str("horizontal"),
        }
    }
}

/// Indicates an attempt to set a stick axis outside `[-limit, limit]` without going through the
/// command mapper. This is a caller bug, typically a gain that bypassed the mapper's clamp.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{axis} stick position {value} is outside [-{limit}, {limit}]")]
pub struct StickOutOfRange {
    pub axis: Axis,
    pub value: i32,
    pub limit: i32,
}
