//! # Restart and backoff policies.
//!
//! - [`RestartPolicy`] whether a child exit leads to a respawn.
//! - [`Backoff`] how long to wait before the respawn.

mod backoff;
mod restart;

pub use backoff::Backoff;
pub use restart::RestartPolicy;
