//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that lets the
//! supervisor and the monitors broadcast [`Event`]s to any number of
//! subscribers.
//!
//! - **Broadcast semantics**: every active subscriber receives a clone of
//!   each event.
//! - **Non-persistent**: events published with no active subscriber are
//!   dropped silently; the tunnel runs fine unobserved.
//! - **Bounded capacity**: slow subscribers lag and skip old events rather
//!   than blocking the publisher.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to all active subscribers (non-blocking).
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates an independent receiver for all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
