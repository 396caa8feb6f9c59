//! JSON datagram formats of the external producers.
//!
//! The route producer sends either a bare start trigger or the current and destination
//! coordinates. The perception producer sends one detection per datagram. Missing coordinates
//! decode to NaN so that they surface as invalid location data in the state machine rather than
//! being dropped here.

use serde::Deserialize;
use thiserror::Error;

use crate::geo::Position;
use crate::tracking::{TrackingSample, TrackingUpdate};

/// Errors that can occur while decoding producer datagrams.
#[derive(Debug, Error)]
pub enum WireError {
    /// The datagram was not valid JSON for the expected message.
    #[error("malformed datagram")]
    Json(#[from] serde_json::Error),

    /// A route datagram carried neither a start trigger nor both locations.
    #[error("route datagram has neither start_flag nor location and dest_location")]
    MissingLocation,

    /// A normalized offset was not a finite number in [-1, 1].
    #[error("normalized offset {axis} = {value} is outside [-1, 1]")]
    OffsetOutOfRange { axis: &'static str, value: f64 },
}

#[derive(Debug, Deserialize)]
struct Coordinates {
    lat: Option<f64>,
    lng: Option<f64>,
    heading: Option<f64>,
}

impl Coordinates {
    fn position(&self, altitude: f64) -> Position {
        Position::new(
            self.lat.unwrap_or(f64::NAN),
            self.lng.unwrap_or(f64::NAN),
            altitude,
        )
    }
}

#[derive(Debug, Deserialize)]
struct RouteMessage {
    #[serde(default, alias = "startFlag")]
    start_flag: bool,
    location: Option<Coordinates>,
    dest_location: Option<Coordinates>,
}

#[derive(Debug, Deserialize)]
struct TrackingMessage {
    box_width: f64,
    box_height: f64,
    normalized_offset_x: f64,
    normalized_offset_y: f64,
    is_locked: bool,
}

/// A decoded route datagram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RouteDatagram {
    Start,
    Location {
        current: Position,
        heading_deg: Option<f64>,
        destination: Position,
    },
}

/// Decode a route datagram. Both positions get `altitude` since the producer reports none.
pub fn decode_route(bytes: &[u8], altitude: f64) -> Result<RouteDatagram, WireError> {
    let message: RouteMessage = serde_json::from_slice(bytes)?;

    if message.start_flag {
        return Ok(RouteDatagram::Start);
    }

    match (message.location, message.dest_location) {
        (Some(location), Some(destination)) => Ok(RouteDatagram::Location {
            current: location.position(altitude),
            heading_deg: location.heading,
            destination: destination.position(altitude),
        }),
        _ => Err(WireError::MissingLocation),
    }
}

/// Decode a tracking datagram, stamping it with the receive time.
pub fn decode_tracking(bytes: &[u8], received_ms: i64) -> Result<TrackingUpdate, WireError> {
    let message: TrackingMessage = serde_json::from_slice(bytes)?;

    for (axis, value) in [
        ("x", message.normalized_offset_x),
        ("y", message.normalized_offset_y),
    ] {
        if !(-1.0..=1.0).contains(&value) {
            return Err(WireError::OffsetOutOfRange { axis, value });
        }
    }

    Ok(TrackingUpdate {
        sample: TrackingSample {
            timestamp_ms: received_ms,
            box_width: message.box_width,
            box_height: message.box_height,
            offset_x: message.normalized_offset_x,
            offset_y: message.normalized_offset_y,
        },
        locked: message.is_locked,
    })
}
