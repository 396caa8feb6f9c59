use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use tracknav::config::NavigatorConfig;
use tracknav::geo::Position;
use tracknav::navigator::{self, Navigator, NavigatorHandles};
use tracknav::slot::SlotWriter;
use tracknav::state_machine::navigation::{GpsFix, MissionControl, NavigationEvent};
use tracknav::stick::StickCommand;
use tracknav::tracking::TrackingUpdate;
use tracknav::wire::{self, RouteDatagram};
use tracknav::{MISSION_CHANNEL_CAPACITY, ROUTE_PORT, TRACKING_PORT, monotonic_ms};

const DATAGRAM_SIZE: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = load_config()?;
    config.validate()?;

    let route_addr: SocketAddr = std::env::var("ROUTE_ADDR")
        .unwrap_or_else(|_| format!("0.0.0.0:{ROUTE_PORT}"))
        .parse()?;
    let tracking_addr: SocketAddr = std::env::var("TRACKING_ADDR")
        .unwrap_or_else(|_| format!("0.0.0.0:{TRACKING_PORT}"))
        .parse()?;

    let origin = Instant::now();
    let (handles, inputs) = navigator::channels(MISSION_CHANNEL_CAPACITY);
    let (command_tx, command_rx) = watch::channel(StickCommand::neutral(config.max_stick_value));
    let (event_tx, event_rx) = broadcast::channel(64);

    let route_socket = UdpSocket::bind(route_addr)
        .await
        .with_context(|| format!("failed to bind route socket on {route_addr}"))?;
    let tracking_socket = UdpSocket::bind(tracking_addr)
        .await
        .with_context(|| format!("failed to bind tracking socket on {tracking_addr}"))?;

    info!(route = %route_addr, tracking = %tracking_addr, "Listening for producers");

    let NavigatorHandles {
        gps,
        tracking,
        missions,
    } = handles;

    let altitude = config.altitude_setpoint_m;
    tokio::spawn(async move {
        if let Err(e) = receive_route(route_socket, gps, missions, altitude, origin).await {
            error!(error = %e, "Route receiver stopped");
        }
    });
    tokio::spawn(async move {
        if let Err(e) = receive_tracking(tracking_socket, tracking, origin).await {
            error!(error = %e, "Tracking receiver stopped");
        }
    });
    tokio::spawn(log_commands(command_rx));
    tokio::spawn(log_events(event_rx));

    let navigator = Navigator::new(config, inputs, command_tx, event_tx);
    let final_state = navigator
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await;

    info!(state = ?final_state, "Shut down");
    Ok(())
}

fn load_config() -> Result<NavigatorConfig> {
    match std::env::var("TRACKNAV_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read(&path).with_context(|| format!("failed to read {path}"))?;
            let config = serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {path}"))?;
            info!(path = %path, "Loaded configuration");
            Ok(config)
        }
        Err(_) => Ok(NavigatorConfig::default()),
    }
}

/// Publishes every location as a GPS fix and turns the start trigger into mission control.
/// Once started, a moving destination re-targets the mission.
async fn receive_route(
    socket: UdpSocket,
    gps: SlotWriter<GpsFix>,
    missions: mpsc::Sender<MissionControl>,
    altitude: f64,
    origin: Instant,
) -> Result<()> {
    let mut buf = [0u8; DATAGRAM_SIZE];
    let mut started = false;
    let mut destination: Option<Position> = None;

    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;

        let datagram = match wire::decode_route(&buf[..len], altitude) {
            Ok(datagram) => datagram,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Dropping route datagram");
                continue;
            }
        };

        match datagram {
            RouteDatagram::Start => {
                info!(peer = %peer, "Start trigger received");
                started = true;
                if let Some(destination) = destination {
                    missions.send(MissionControl::start(destination)).await?;
                }
            }
            RouteDatagram::Location {
                current,
                heading_deg,
                destination: next,
            } => {
                gps.publish(GpsFix {
                    position: current,
                    heading_deg,
                    timestamp_ms: monotonic_ms(origin),
                });

                if started && is_new_target(destination, next) {
                    missions.send(MissionControl::start(next)).await?;
                }
                destination = Some(next);
            }
        }
    }
}

/// Compares coordinate bit patterns so a repeated NaN destination is not a new target.
fn is_new_target(previous: Option<Position>, next: Position) -> bool {
    previous.is_none_or(|previous| {
        previous.latitude.to_bits() != next.latitude.to_bits()
            || previous.longitude.to_bits() != next.longitude.to_bits()
    })
}

async fn receive_tracking(
    socket: UdpSocket,
    tracking: SlotWriter<TrackingUpdate>,
    origin: Instant,
) -> Result<()> {
    let mut buf = [0u8; DATAGRAM_SIZE];

    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;

        match wire::decode_tracking(&buf[..len], monotonic_ms(origin)) {
            Ok(update) => tracking.publish(update),
            Err(e) => warn!(peer = %peer, error = %e, "Dropping tracking datagram"),
        }
    }
}

/// Stand-in for the actuation transport: only the latest command is ever looked at.
async fn log_commands(mut commands: watch::Receiver<StickCommand>) {
    while commands.changed().await.is_ok() {
        let command = *commands.borrow_and_update();
        debug!(
            vertical = command.vertical(),
            horizontal = command.horizontal(),
            "Stick command"
        );
    }
}

async fn log_events(mut events: broadcast::Receiver<NavigationEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => info!(event = ?event, "Navigation event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Telemetry consumer lagged")
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
