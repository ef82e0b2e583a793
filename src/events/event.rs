//! # Runtime events emitted by the supervisor and the monitors.
//!
//! [`EventKind`] enumerates the observable moments of a tunnel's life;
//! [`Event`] carries the kind plus optional metadata attached builder-style.
//! Each kind maps to a stable snake_case name, which is the `event` field of
//! the JSON log record the [`JsonLogWriter`](crate::subscribers::JsonLogWriter)
//! writes.
//!
//! ## Event flow of one restart
//! ```text
//! ssh_started ──► (network change) ──► restart_triggered{reason}
//!             ──► ssh_exited{exit, class} ──► restart_scheduled{delay_ms}
//!             ──► ssh_started
//! ```

use std::time::{Duration, SystemTime};

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Supervisor lifecycle ===
    /// Supervisor started.
    AgentStart,
    /// Supervisor is shutting down.
    AgentStop,
    /// An explicit stop was requested.
    StopRequested,

    // === Child lifecycle ===
    /// Child could not be spawned.
    SshStartFailed,
    /// Child is up; the tunnel is presumed established.
    SshStarted,
    /// Child exited; carries the formatted exit, its class, and a stderr
    /// summary when one exists.
    SshExited,

    // === Restart machinery ===
    /// A trigger was accepted and the child was signaled.
    RestartTriggered,
    /// A trigger was dropped by the debounce window.
    RestartSkipped,
    /// A respawn is scheduled after a backoff delay.
    RestartScheduled,

    // === Monitors ===
    /// A monitor began watching.
    MonitorStarted,
    /// A monitor observed something worth noting (wake, network change).
    MonitorEvent,
    /// A monitor hit a recoverable error.
    MonitorError,

    /// Free-form message without further structure.
    Message,
}

impl EventKind {
    /// Stable snake_case name used as the log record's `event` field.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::AgentStart => "agent_start",
            EventKind::AgentStop => "agent_stop",
            EventKind::StopRequested => "stop_requested",
            EventKind::SshStartFailed => "ssh_start_failed",
            EventKind::SshStarted => "ssh_started",
            EventKind::SshExited => "ssh_exited",
            EventKind::RestartTriggered => "restart_triggered",
            EventKind::RestartSkipped => "restart_skipped",
            EventKind::RestartScheduled => "restart_scheduled",
            EventKind::MonitorStarted => "monitor_started",
            EventKind::MonitorEvent => "monitor_event",
            EventKind::MonitorError => "monitor_error",
            EventKind::Message => "message",
        }
    }
}

/// Runtime event with optional metadata.
#[derive(Debug, Clone)]
pub struct Event {
    /// Wall-clock timestamp; for logging only.
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Trigger reason tag (`"sleep"`, `"wake"`, `"network change"`,
    /// `"periodic"`, or mutation text).
    pub reason: Option<String>,
    /// Extra qualifier, e.g. `"debounced"` on a skipped restart.
    pub detail: Option<String>,
    /// Exit class tag (`"clean"`, `"auth"`, ...).
    pub class: Option<String>,
    /// Human-readable exit description.
    pub exit: Option<String>,
    /// Summary of the child's recent stderr.
    pub stderr: Option<String>,
    /// Endpoint summary (`user@host:port`).
    pub summary: Option<String>,
    /// Error message, when the event represents a failure.
    pub error: Option<String>,
    /// Originating monitor name (`"sleep"`, `"network"`).
    pub monitor: Option<String>,
    /// Free-form message.
    pub msg: Option<String>,
    /// Backoff delay, when the event schedules one.
    pub delay: Option<Duration>,
    /// Explicit level override; derived from the kind when absent.
    pub level: Option<&'static str>,
}

impl Event {
    /// Creates a new event of the given kind stamped with the current time.
    pub fn now(kind: EventKind) -> Self {
        Self {
            at: SystemTime::now(),
            kind,
            reason: None,
            detail: None,
            class: None,
            exit: None,
            stderr: None,
            summary: None,
            error: None,
            monitor: None,
            msg: None,
            delay: None,
            level: None,
        }
    }

    /// Informational free-form message.
    pub fn info(msg: impl Into<String>) -> Self {
        Self::now(EventKind::Message).with_msg(msg)
    }

    /// Error-level free-form message.
    pub fn error_msg(msg: impl Into<String>) -> Self {
        let mut ev = Self::now(EventKind::Message).with_msg(msg);
        ev.level = Some("ERROR");
        ev
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_exit(mut self, exit: impl Into<String>) -> Self {
        self.exit = Some(exit.into());
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = Some(stderr.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_monitor(mut self, monitor: impl Into<String>) -> Self {
        self.monitor = Some(monitor.into());
        self
    }

    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Log level of the record this event renders to.
    ///
    /// A child exit is an error unless it was classified clean.
    pub fn level(&self) -> &'static str {
        if let Some(level) = self.level {
            return level;
        }
        match self.kind {
            EventKind::SshStartFailed | EventKind::MonitorError => "ERROR",
            EventKind::SshExited if self.class.as_deref() != Some("clean") => "ERROR",
            _ => "INFO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_attaches_metadata() {
        let ev = Event::now(EventKind::RestartTriggered)
            .with_reason("network change")
            .with_detail("debounced");
        assert_eq!(ev.kind.name(), "restart_triggered");
        assert_eq!(ev.reason.as_deref(), Some("network change"));
        assert_eq!(ev.detail.as_deref(), Some("debounced"));
        assert_eq!(ev.level(), "INFO");
    }

    #[test]
    fn exit_level_follows_class() {
        let clean = Event::now(EventKind::SshExited).with_class("clean");
        assert_eq!(clean.level(), "INFO");
        let auth = Event::now(EventKind::SshExited).with_class("auth");
        assert_eq!(auth.level(), "ERROR");
        let unclassified = Event::now(EventKind::SshExited);
        assert_eq!(unclassified.level(), "ERROR");
    }

    #[test]
    fn failure_kinds_are_errors() {
        assert_eq!(Event::now(EventKind::SshStartFailed).level(), "ERROR");
        assert_eq!(Event::now(EventKind::MonitorError).level(), "ERROR");
        assert_eq!(Event::now(EventKind::SshStarted).level(), "INFO");
    }
}
