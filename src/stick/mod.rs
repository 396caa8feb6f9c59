//! Mapping of physical corrections onto the two-axis virtual stick.
//!
//! There are exactly two ways to get a non-neutral [`StickCommand`]:
//!
//! - [`build_command`] / [`to_stick_axis`], which scale and then *clamp* into range, and
//! - [`StickCommand::try_new`] and the `set_*` methods, which *reject* anything out of range with
//!   [`StickOutOfRange`].
//!
//! A command that exists is therefore always within `[-limit, limit]` on both axes.

pub mod error;

pub use self::error::{Axis, StickOutOfRange};

/// Default stick deflection limit of the actuation transport.
pub const MAX_STICK_VALUE: i32 = 660;

/// A virtual stick deflection published to the actuation sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StickCommand {
    vertical: i32,
    horizontal: i32,
    limit: i32,
}

impl StickCommand {
    /// A centered stick for the given limit.
    pub fn neutral(limit: i32) -> Self {
        Self {
            vertical: 0,
            horizontal: 0,
            limit,
        }
    }

    /// Construct a command from already-scaled axis values, rejecting out-of-range input.
    pub fn try_new(vertical: i32, horizontal: i32, limit: i32) -> Result<Self, StickOutOfRange> {
        let mut command = Self::neutral(limit);
        command.set_vertical(vertical)?;
        command.set_horizontal(horizontal)?;
        Ok(command)
    }

    pub fn vertical(&self) -> i32 {
        self.vertical
    }

    pub fn horizontal(&self) -> i32 {
        self.horizontal
    }

    pub fn limit(&self) -> i32 {
        self.limit
    }

    pub fn is_neutral(&self) -> bool {
        self.vertical == 0 && self.horizontal == 0
    }

    pub fn set_vertical(&mut self, position: i32) -> Result<(), StickOutOfRange> {
        self.vertical = self.checked(Axis::Vertical, position)?;
        Ok(())
    }

    pub fn set_horizontal(&mut self, position: i32) -> Result<(), StickOutOfRange> {
        self.horizontal = self.checked(Axis::Horizontal, position)?;
        Ok(())
    }

    fn checked(&self, axis: Axis, value: i32) -> Result<i32, StickOutOfRange> {
        if (-self.limit..=self.limit).contains(&value) {
            Ok(value)
        } else {
            Err(StickOutOfRange {
                axis,
                value,
                limit: self.limit,
            })
        }
    }
}

/// Scale a physical correction by `scale`, round it and clamp it into `[-max_stick, max_stick]`.
///
/// NaN input maps to zero deflection. A non-positive `max_stick` only admits zero.
pub fn to_stick_axis(value: f64, scale: f64, max_stick: i32) -> i32 {
    let limit = f64::from(max_stick.max(0));
    let scaled = (value * scale).round();

    if scaled.is_nan() {
        return 0;
    }

    scaled.clamp(-limit, limit) as i32
}

/// Map raw vertical/horizontal corrections into a [`StickCommand`] through [`to_stick_axis`].
pub fn build_command(
    vertical_raw: f64,
    horizontal_raw: f64,
    scale: f64,
    max_stick: i32,
) -> StickCommand {
    build_scaled_command(vertical_raw, scale, horizontal_raw, scale, max_stick)
}

/// Like [`build_command`], with a separate gain per axis.
pub fn build_scaled_command(
    vertical_raw: f64,
    vertical_scale: f64,
    horizontal_raw: f64,
    horizontal_scale: f64,
    max_stick: i32,
) -> StickCommand {
    StickCommand {
        vertical: to_stick_axis(vertical_raw, vertical_scale, max_stick),
        horizontal: to_stick_axis(horizontal_raw, horizontal_scale, max_stick),
        limit: max_stick.max(0),
    }
}
