//! # Event subscribers.
//!
//! [`Subscribe`] is the extension point for consuming runtime events fanned
//! out from the [`Bus`](crate::events::Bus); [`JsonLogWriter`] is the
//! shipped implementation, rendering events into the structured
//! [`Logger`](crate::logging::Logger).

mod log;
mod subscribe;

pub use log::JsonLogWriter;
pub use subscribe::Subscribe;
