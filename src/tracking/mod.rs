//! Predictive visual tracking.
//!
//! The perception pipeline reports where the target sits in the image, but by the time a command
//! built from that report reaches the vehicle the target has moved on. [`compute_delta`] estimates
//! the per-axis drift rate between two reports and leads the newest offset by the configured
//! pipeline latency.

/// One report from the perception pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingSample {
    /// Capture time in monotonic milliseconds.
    pub timestamp_ms: i64,
    pub box_width: f64,
    pub box_height: f64,
    /// Horizontal offset of the target from the image center, in [-1, 1].
    pub offset_x: f64,
    /// Vertical offset of the target from the image center, in [-1, 1].
    pub offset_y: f64,
}

/// A tracking sample together with the detector's lock state.
///
/// An unlocked update means the target was lost; the previous sample must not be paired with
/// whatever the detector locks onto next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingUpdate {
    pub sample: TrackingSample,
    pub locked: bool,
}

/// Drift between two tracking samples and the offset predicted after the compensation delay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingDelta {
    pub elapsed_secs: f64,
    pub delta_x: f64,
    pub delta_y: f64,
    /// Offset change per second on the horizontal axis.
    pub error_rate_x: f64,
    /// Offset change per second on the vertical axis.
    pub error_rate_y: f64,
    pub future_offset_x: f64,
    pub future_offset_y: f64,
}

/// Compute the drift from `old` to `new` and lead `new` by `compensation_delay_ms`.
///
/// Out-of-order samples clamp the elapsed time to zero, and a zero elapsed time yields zero error
/// rates, so the prediction degrades to the newest offset instead of inverting or dividing by zero.
pub fn compute_delta(
    old: &TrackingSample,
    new: &TrackingSample,
    compensation_delay_ms: u64,
) -> TrackingDelta {
    let elapsed_secs = (new.timestamp_ms.saturating_sub(old.timestamp_ms)).max(0) as f64 / 1000.0;

    let delta_x = new.offset_x - old.offset_x;
    let delta_y = new.offset_y - old.offset_y;

    let (error_rate_x, error_rate_y) = if elapsed_secs > 0.0 {
        (delta_x / elapsed_secs, delta_y / elapsed_secs)
    } else {
        (0.0, 0.0)
    };

    let compensation_secs = compensation_delay_ms as f64 / 1000.0;

    TrackingDelta {
        elapsed_secs,
        delta_x,
        delta_y,
        error_rate_x,
        error_rate_y,
        future_offset_x: new.offset_x + error_rate_x * compensation_secs,
        future_offset_y: new.offset_y + error_rate_y * compensation_secs,
    }
}
