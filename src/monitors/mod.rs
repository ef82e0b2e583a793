//! # OS event producers feeding the restart funnel.
//!
//! Every monitor is an async task bound to a [`CancellationToken`]; on
//! cancel it stops, on observation it calls `on_event` with a stable reason
//! tag (`"sleep"`, `"wake"`, `"network change"`) and notes what it saw on
//! the event bus. An interval of zero disables a monitor before it starts.
//!
//! These are the portable producers: wall-clock gap detection for
//! suspend/resume and interface-fingerprint polling for network changes.
//! Platform-native backends (IOKit power notifications, SystemConfiguration
//! dynamic-store keys) satisfy the same contract and would slot in behind a
//! target gate without touching the supervisor.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

mod network;
mod sleep;

pub use network::network_monitor;
pub use sleep::sleep_monitor;
