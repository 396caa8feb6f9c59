//! Outbound seams of the control task.
//!
//! The actuation transport and the telemetry consumers live outside this crate. The navigator only
//! needs something it can hand a command or an event to without blocking.

use tokio::sync::{broadcast, watch};
use tracing::trace;

use crate::state_machine::navigation::NavigationEvent;
use crate::stick::StickCommand;

/// Receives the command of every control tick. A newly published command supersedes the previous
/// one; implementations must not queue.
pub trait CommandSink {
    fn publish(&self, command: StickCommand);
}

/// Receives navigation events for telemetry and user-facing collaborators.
pub trait EventSink {
    fn emit(&self, event: NavigationEvent);
}

impl CommandSink for watch::Sender<StickCommand> {
    fn publish(&self, command: StickCommand) {
        self.send_replace(command);
    }
}

impl EventSink for broadcast::Sender<NavigationEvent> {
    fn emit(&self, event: NavigationEvent) {
        if self.send(event).is_err() {
            trace!("No telemetry subscribers for navigation event");
        }
    }
}
