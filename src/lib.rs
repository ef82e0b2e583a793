//! # rpa
//!
//! **rpa** is a long-lived supervisor that keeps a persistent SSH tunnel
//! alive. It drives an external `ssh` process, watches its health, reacts
//! to events that invalidate the tunnel (laptop sleep/wake, network
//! interface changes, a configured periodic refresh), and restarts the
//! child under a jittered backoff with exit classification.
//!
//! ## Features
//!
//! | Area              | Description                                                       | Key types                                   |
//! |-------------------|-------------------------------------------------------------------|---------------------------------------------|
//! | **Supervision**   | Spawn/wait loop, restart funnel, debounce, graceful stop.         | [`Supervisor`], [`Snapshot`]                |
//! | **Policies**      | Restart decision and jittered exponential backoff.                | [`RestartPolicy`], [`Backoff`]              |
//! | **Classification**| Map (exit code, stderr) to a restart class; terminal classes halt.| [`ExitClass`], [`classify`]                 |
//! | **Monitors**      | Sleep/wake and network-change producers under one contract.       | [`monitors`]                                |
//! | **Events**        | Broadcast bus with pluggable subscribers.                         | [`Bus`], [`Event`], [`Subscribe`]           |
//! | **Control**       | Unix-socket status, metrics, logs, stop, forward mutations.       | [`ControlServer`]                           |
//! | **Configuration** | YAML schema, defaults, forward-set normalization.                 | [`Config`]                                  |
//!
//! ## Roles
//!
//! The same supervisor serves both ends of a bastion: an **agent**
//! maintains remote forwards (`-R`) exposing local services, a **client**
//! maintains local forwards (`-L`) consuming them. The forward flag is the
//! only asymmetry ([`ForwardMode`]).
//!
//! ```no_run
//! use std::sync::Arc;
//! use rpa::{Config, ForwardMode, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::load("config.yaml")?;
//!     cfg.validate()?;
//!
//!     let supervisor = Arc::new(Supervisor::new(cfg, ForwardMode::Remote, Vec::new()));
//!     supervisor.run().await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod ipc;
pub mod lines;
pub mod logging;
pub mod monitors;
pub mod policies;
pub mod signals;
pub mod state;
pub mod subscribers;
pub mod supervisor;

// ---- Public re-exports ----

pub use config::Config;
pub use error::{AgentError, ConfigError};
pub use events::{Bus, Event, EventKind};
pub use ipc::ControlServer;
pub use lines::LineRing;
pub use logging::Logger;
pub use policies::{Backoff, RestartPolicy};
pub use state::{Lifecycle, State};
pub use subscribers::{JsonLogWriter, Subscribe};
pub use supervisor::{
    build_ssh_command, classify, ExitClass, ForwardMode, Snapshot, SshCommand, Supervisor,
};
