//! Single-slot, last-value-wins holders for sensor input.
//!
//! Each producer owns a [`SlotWriter`] and overwrites the slot on every new reading; older unread
//! values are discarded. The control task reads a [`SlotReader::snapshot`] once per tick. Backed by
//! [`tokio::sync::watch`], so a snapshot never observes a half-written value and a publish never
//! waits on the reader.

use tokio::sync::watch;
use tokio::time::Instant;

/// A value together with the moment it was handed to its slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stamped<T> {
    pub value: T,
    pub received_at: Instant,
}

impl<T> Stamped<T> {
    pub fn new(value: T, received_at: Instant) -> Self {
        Self { value, received_at }
    }

    /// Returns `true` if the value is no older than `timeout` at `now`.
    pub fn is_fresh(&self, now: Instant, timeout: std::time::Duration) -> bool {
        now.saturating_duration_since(self.received_at) <= timeout
    }
}

/// Producer half of a slot.
#[derive(Debug)]
pub struct SlotWriter<T> {
    tx: watch::Sender<Option<Stamped<T>>>,
}

impl<T> SlotWriter<T> {
    /// Overwrite the slot, stamping the value with the current time.
    pub fn publish(&self, value: T) {
        self.publish_at(value, Instant::now());
    }

    /// Overwrite the slot with an explicit receive time.
    pub fn publish_at(&self, value: T, received_at: Instant) {
        self.tx.send_replace(Some(Stamped::new(value, received_at)));
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }
}

/// Consumer half of a slot.
#[derive(Debug, Clone)]
pub struct SlotReader<T> {
    rx: watch::Receiver<Option<Stamped<T>>>,
}

impl<T: Clone> SlotReader<T> {
    /// Copy out the most recent value, if any was ever published.
    pub fn snapshot(&self) -> Option<Stamped<T>> {
        self.rx.borrow().clone()
    }
}

/// Create an empty slot.
pub fn slot<T>() -> (SlotWriter<T>, SlotReader<T>) {
    let (tx, rx) = watch::channel(None);
    (SlotWriter { tx }, SlotReader { rx })
}
