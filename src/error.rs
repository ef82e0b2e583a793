//! # Error types used by the rpa runtime.
//!
//! Two enums cover the crate:
//!
//! - [`ConfigError`] configuration loading and validation failures. These are
//!   fatal: the binary reports them and exits nonzero before the supervisor
//!   loop begins.
//! - [`AgentError`] errors raised by the supervisor runtime itself.
//!
//! Both types provide `as_label` for stable snake_case tags in logs.
//!
//! Per-attempt failures (a spawn that does not start, a child that exits, a
//! control connection that sends garbage) are deliberately *not* modeled
//! here: the supervisor recovers from them locally and feeds them into the
//! restart decision instead of surfacing an error.

use std::path::PathBuf;

use thiserror::Error;

use crate::state::State;

/// Errors produced while loading, validating, or persisting configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid YAML for the expected schema.
    #[error("parse yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Config file could not be written back.
    #[error("write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required field is missing or empty.
    #[error("{field} is required")]
    Missing { field: &'static str },

    /// A field is present but holds a value outside its allowed range.
    #[error("{field} {reason}")]
    Invalid { field: &'static str, reason: String },

    /// The user's home directory could not be resolved.
    #[error("resolve home directory")]
    Home,
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "config_read",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Write { .. } => "config_write",
            ConfigError::Missing { .. } => "config_missing_field",
            ConfigError::Invalid { .. } => "config_invalid_field",
            ConfigError::Home => "config_home_dir",
        }
    }
}

/// Errors produced by the supervisor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AgentError {
    /// A lifecycle transition outside the allowed table was attempted.
    ///
    /// The state machine is left unchanged; the caller decides how to
    /// proceed.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: State, to: State },

    /// Configuration was rejected when building the child command.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The child process (or its pipes) could not be started.
    #[error("spawn child: {0}")]
    Spawn(#[from] std::io::Error),

    /// The log file or its directory could not be prepared.
    #[error("open log {path}: {source}")]
    Logging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AgentError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            AgentError::InvalidTransition { .. } => "invalid_transition",
            AgentError::Config(_) => "config",
            AgentError::Spawn(_) => "spawn_failed",
            AgentError::Logging { .. } => "logging",
        }
    }
}
