//! # Runtime events and the broadcast bus.
//!
//! The supervisor and the monitors publish typed [`Event`]s to a [`Bus`];
//! a listener task fans them out to [`Subscribe`](crate::subscribers::Subscribe)
//! implementors. The shipped subscriber renders events as structured JSON
//! log records; tests subscribe directly to observe supervisor behavior.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
