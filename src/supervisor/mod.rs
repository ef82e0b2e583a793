//! # Supervisor: owns the child process and the restart machinery.
//!
//! The [`Supervisor`] runs a single loop that alternates between spawning
//! the external ssh client and waiting for it, while four concurrent event
//! sources feed one restart-trigger funnel:
//!
//! ```text
//! sleep/wake monitor ──┐
//! network monitor    ──┤
//! periodic ticker    ──┼──► request_restart(reason)
//! forward mutations  ──┘          │
//!                                 ├─► dropped unless CONNECTED
//!                                 ├─► debounced per restart.debounce_ms
//!                                 └─► graceful signal to the child;
//!                                     the wait phase classifies the exit
//!                                     and decides the restart
//! ```
//!
//! ## Rules
//! - Every state change funnels through the [`Lifecycle`] transition table.
//! - The child handle is owned by the loop; the shared slot holds only the
//!   pid, so triggers signal best-effort and never reap.
//! - Counters and last-reason fields live under one mutex; readers always
//!   see a consistent [`Snapshot`].
//! - Terminal exit classes (`auth`, `hostkey`) halt the supervisor; no
//!   amount of restarting fixes a bad key.
//! - A stop request wins everywhere: during the child wait, during the
//!   backoff sleep, and in the monitors (via the root cancellation scope).

mod classify;
mod command;

pub use classify::{classify, ExitClass};
pub use command::{build_ssh_command, ForwardMode, SshCommand};

use std::process::Stdio;
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant, SystemTime};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::config::Config;
use crate::error::AgentError;
use crate::events::{Bus, Event, EventKind};
use crate::lines::LineRing;
use crate::policies::{Backoff, RestartPolicy};
use crate::state::{Lifecycle, State};
use crate::subscribers::Subscribe;

/// Capacity of the per-spawn stderr buffer fed to the classifier.
const STDERR_RING_CAPACITY: usize = 10;
/// Event bus channel capacity.
const BUS_CAPACITY: usize = 1024;
/// How long a stopping child gets before SIGKILL.
const STOP_GRACE: Duration = Duration::from_secs(3);
/// Stderr summaries in exit logs are cut at this many characters.
const SUMMARY_MAX_CHARS: usize = 200;

/// Consistent view of the supervisor's counters and last-reason fields,
/// produced under a single lock acquisition.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: State,
    pub summary: String,
    pub start_success: u64,
    pub start_failure: u64,
    pub exit_success: u64,
    pub exit_failure: u64,
    pub restart_count: u64,
    pub last_exit: String,
    pub last_class: String,
    pub last_trigger_reason: String,
    pub last_success: Option<SystemTime>,
    pub last_trigger_at: Option<Instant>,
    pub current_backoff: Duration,
}

#[derive(Default)]
struct Inner {
    start_success: u64,
    start_failure: u64,
    exit_success: u64,
    exit_failure: u64,
    restart_count: u64,
    last_exit: String,
    last_class: String,
    last_trigger_reason: String,
    last_success: Option<SystemTime>,
    last_trigger: Option<Instant>,
    child_pid: Option<i32>,
}

/// Keeps one persistent ssh tunnel alive.
pub struct Supervisor {
    cfg: Config,
    mode: ForwardMode,
    policy: RestartPolicy,
    fsm: Lifecycle,
    bus: Bus,
    subs: Arc<Vec<Arc<dyn Subscribe>>>,
    stop: CancellationToken,
    stop_once: Once,
    forwards: Mutex<Vec<String>>,
    backoff: Mutex<Backoff>,
    inner: Mutex<Inner>,
}

impl Supervisor {
    /// Creates a supervisor for a validated config.
    ///
    /// `subscribers` receive every runtime event in publish order; pass an
    /// empty vec to run unobserved.
    pub fn new(cfg: Config, mode: ForwardMode, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let policy = RestartPolicy::from_name(&cfg.agent.restart_policy);
        let backoff = Backoff::new(&cfg.agent.restart);
        let forwards = cfg.normalize_forwards();
        Self {
            policy,
            mode,
            fsm: Lifecycle::new(),
            bus: Bus::new(BUS_CAPACITY),
            subs: Arc::new(subscribers),
            stop: CancellationToken::new(),
            stop_once: Once::new(),
            forwards: Mutex::new(forwards),
            backoff: Mutex::new(backoff),
            inner: Mutex::new(Inner::default()),
            cfg,
        }
    }

    /// The event bus; tests and embedders may subscribe directly.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.fsm.state()
    }

    /// Snapshot of the forward list.
    pub fn forwards(&self) -> Vec<String> {
        self.forwards
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Consistent snapshot for status and metrics.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Snapshot {
            state: self.fsm.state(),
            summary: self.cfg.summary(),
            start_success: inner.start_success,
            start_failure: inner.start_failure,
            exit_success: inner.exit_success,
            exit_failure: inner.exit_failure,
            restart_count: inner.restart_count,
            last_exit: inner.last_exit.clone(),
            last_class: inner.last_class.clone(),
            last_trigger_reason: inner.last_trigger_reason.clone(),
            last_success: inner.last_success,
            last_trigger_at: inner.last_trigger,
            current_backoff: self
                .backoff
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .current(),
        }
    }

    /// Runs the supervisor until a terminal exit class, a stop request, or
    /// a restart policy that declines the next respawn.
    ///
    /// Spawns the subscriber listener, the monitors, and the periodic
    /// ticker, all bound to the stop scope; they are awaited before this
    /// returns.
    pub async fn run(self: Arc<Self>) -> Result<(), AgentError> {
        self.subscriber_listener();
        self.bus
            .publish(Event::now(EventKind::AgentStart).with_summary(self.cfg.summary()));

        let scope = self.stop.child_token();
        let mut watchers = Vec::new();

        let check = Duration::from_secs(self.cfg.agent.sleep_check_sec);
        if !check.is_zero() {
            let gap = Duration::from_secs(self.cfg.agent.sleep_gap_sec);
            let sup = Arc::clone(&self);
            let bus = self.bus.clone();
            let token = scope.clone();
            watchers.push(tokio::spawn(async move {
                crate::monitors::sleep_monitor(check, gap, token, bus, move |reason| {
                    sup.request_restart(reason)
                })
                .await;
            }));
        }

        let poll = Duration::from_secs(self.cfg.agent.network_poll_sec);
        if !poll.is_zero() {
            let sup = Arc::clone(&self);
            let bus = self.bus.clone();
            let token = scope.clone();
            watchers.push(tokio::spawn(async move {
                crate::monitors::network_monitor(poll, token, bus, move |reason| {
                    sup.request_restart(reason)
                })
                .await;
            }));
        }

        let periodic = Duration::from_secs(self.cfg.agent.periodic_restart_sec);
        if !periodic.is_zero() {
            let sup = Arc::clone(&self);
            let token = scope.clone();
            watchers.push(tokio::spawn(async move {
                sup.periodic_loop(periodic, token).await;
            }));
        }

        let result = self.supervise().await;

        scope.cancel();
        for watcher in watchers {
            let _ = watcher.await;
        }

        self.bus.publish(Event::now(EventKind::AgentStop));
        // The listener drains asynchronously; give the final records a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;
        result
    }

    /// Requests a graceful stop; idempotent, callable from any task.
    pub fn request_stop(&self) {
        self.stop_once.call_once(|| {
            self.bus.publish(Event::now(EventKind::StopRequested));
            self.stop.cancel();
        });
    }

    /// Restart-trigger funnel. All sources converge here.
    ///
    /// Triggers while the tunnel is not CONNECTED are dropped: the loop is
    /// already mid-transition and will rebuild the tunnel anyway. This can
    /// lose a real event that lands inside the CONNECTING window; we accept
    /// that rather than queue triggers, because bursts are already
    /// collapsed by the debounce window and a queued trigger would force an
    /// extra restart right after recovery.
    pub fn request_restart(&self, reason: &str) {
        if self.fsm.state() != State::Connected {
            return;
        }
        let window = Duration::from_millis(self.cfg.agent.restart.debounce_ms);
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.last_trigger_reason = reason.to_string();
            if !window.is_zero() {
                if let Some(last) = inner.last_trigger {
                    if last.elapsed() < window {
                        drop(inner);
                        self.bus.publish(
                            Event::now(EventKind::RestartSkipped)
                                .with_reason(reason)
                                .with_detail("debounced"),
                        );
                        return;
                    }
                }
            }
            inner.last_trigger = Some(Instant::now());
        }
        self.bus
            .publish(Event::now(EventKind::RestartTriggered).with_reason(reason));
        self.signal_child(TERMINATE);
    }

    /// Adds a forward and cycles the tunnel. Returns `false` when it was
    /// already present.
    pub fn add_remote_forward(&self, forward: &str) -> Result<bool, AgentError> {
        let trimmed = forward.trim();
        if trimmed.is_empty() {
            return Err(crate::error::ConfigError::Missing {
                field: "remote forward",
            }
            .into());
        }
        {
            let mut forwards = self.forwards.lock().unwrap_or_else(|e| e.into_inner());
            if forwards.iter().any(|have| have == trimmed) {
                return Ok(false);
            }
            forwards.push(trimmed.to_string());
        }
        self.request_restart("remote forward added");
        Ok(true)
    }

    /// Removes a forward and cycles the tunnel. Returns `false` when no
    /// entry matched; refuses to empty the set.
    pub fn remove_remote_forward(&self, forward: &str) -> Result<bool, AgentError> {
        let trimmed = forward.trim();
        if trimmed.is_empty() {
            return Err(crate::error::ConfigError::Missing {
                field: "remote forward",
            }
            .into());
        }
        {
            let mut forwards = self.forwards.lock().unwrap_or_else(|e| e.into_inner());
            if !forwards.iter().any(|have| have == trimmed) {
                return Ok(false);
            }
            if forwards.len() == 1 {
                return Err(crate::error::ConfigError::Invalid {
                    field: "ssh.remote_forwards",
                    reason: "at least one remote forward is required".to_string(),
                }
                .into());
            }
            forwards.retain(|have| have != trimmed);
        }
        self.request_restart("remote forward removed");
        Ok(true)
    }

    /// Empties the forward set and stops the whole supervisor; a tunnel
    /// with nothing to forward has no reason to live.
    pub fn clear_remote_forwards(&self) -> bool {
        {
            let mut forwards = self.forwards.lock().unwrap_or_else(|e| e.into_inner());
            if forwards.is_empty() {
                return false;
            }
            forwards.clear();
        }
        self.request_stop();
        true
    }

    fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let subs = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => {
                        for sub in subs.iter() {
                            sub.on_event(&ev).await;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        });
    }

    async fn supervise(&self) -> Result<(), AgentError> {
        loop {
            if self.stop.is_cancelled() {
                return Ok(());
            }

            let (mut child, ring, drains) = match self.start_child().await {
                Ok(pair) => pair,
                Err(err) => {
                    {
                        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                        inner.last_exit = format!("start failed: {err}");
                        inner.last_trigger_reason = "start failed".to_string();
                        inner.restart_count += 1;
                    }
                    self.bus
                        .publish(Event::now(EventKind::SshStartFailed).with_error(err.to_string()));
                    if !self.sleep_with_backoff().await {
                        return Ok(());
                    }
                    continue;
                }
            };

            self.bus
                .publish(Event::now(EventKind::SshStarted).with_summary(self.cfg.summary()));

            let waited = tokio::select! {
                res = child.wait() => Some(res),
                _ = self.stop.cancelled() => None,
            };

            let Some(wait_result) = waited else {
                // Stop requested while the child runs: interrupt, give it
                // the grace period, then kill.
                self.graceful_stop(child).await;
                for drain in drains {
                    let _ = drain.await;
                }
                self.clear_child();
                self.fsm.transition(State::Stopped)?;
                return Ok(());
            };

            // The pipes hit EOF once the child is gone; wait for the drain
            // tasks so classification sees the complete stderr tail.
            for drain in drains {
                let _ = drain.await;
            }

            let (exit_code, failed, mut exit_msg) = match wait_result {
                Ok(status) => (
                    status.code().unwrap_or(-1),
                    !status.success(),
                    format_exit(&status),
                ),
                Err(err) => (-1, true, format!("exit unknown ({err})")),
            };

            let class = classify(&ring, exit_code, failed);
            if class != ExitClass::Clean {
                exit_msg = format!("{exit_msg} ({class})");
            }

            {
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                if failed {
                    inner.exit_failure += 1;
                } else {
                    inner.exit_success += 1;
                }
                inner.last_class = class.as_str().to_string();
                inner.last_exit = exit_msg.clone();
                inner.child_pid = None;
            }

            let mut exited = Event::now(EventKind::SshExited)
                .with_exit(exit_msg)
                .with_class(class.as_str());
            let summary = stderr_summary(&ring);
            if !summary.is_empty() {
                exited = exited.with_stderr(summary);
            }
            self.bus.publish(exited);

            self.fsm.transition(State::Stopped)?;

            if class.is_terminal() {
                self.bus.publish(Event::error_msg(
                    "detected likely manual fix required; stopping auto-restart",
                ));
                return Ok(());
            }

            let clean = class == ExitClass::Clean;
            if !self.policy.should_restart(clean) {
                self.bus.publish(Event::info(format!(
                    "restart policy: no restart (policy={}, class={class})",
                    self.policy.name()
                )));
                return Ok(());
            }
            if clean {
                self.backoff.lock().unwrap_or_else(|e| e.into_inner()).reset();
            }

            {
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                inner.restart_count += 1;
            }

            if !self.sleep_with_backoff().await {
                return Ok(());
            }
        }
    }

    async fn start_child(&self) -> Result<(Child, Arc<LineRing>, Vec<JoinHandle<()>>), AgentError> {
        self.fsm.transition(State::Connecting)?;
        match self.try_spawn() {
            Ok(spawned) => {
                {
                    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                    inner.child_pid = spawned.0.id().map(|pid| pid as i32);
                    inner.last_success = Some(SystemTime::now());
                    inner.start_success += 1;
                }
                self.fsm.transition(State::Connected)?;
                Ok(spawned)
            }
            Err(err) => {
                self.fsm.transition(State::Stopped)?;
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                inner.start_failure += 1;
                Err(err)
            }
        }
    }

    fn try_spawn(&self) -> Result<(Child, Arc<LineRing>, Vec<JoinHandle<()>>), AgentError> {
        let forwards = self.forwards();
        let cmd = build_ssh_command(&self.cfg, self.mode, &forwards)?;

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let ring = Arc::new(LineRing::new(STDERR_RING_CAPACITY));
        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(tokio::spawn(drain(stdout, None)));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(tokio::spawn(drain(stderr, Some(Arc::clone(&ring)))));
        }
        Ok((child, ring, drains))
    }

    /// Sleeps the next backoff delay; returns `false` when a stop request
    /// short-circuited the sleep.
    async fn sleep_with_backoff(&self) -> bool {
        let delay = self
            .backoff
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .next();
        if delay.is_zero() {
            return !self.stop.is_cancelled();
        }
        self.bus
            .publish(Event::now(EventKind::RestartScheduled).with_delay(delay));
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = self.stop.cancelled() => false,
        }
    }

    async fn graceful_stop(&self, mut child: Child) {
        self.signal_child(INTERRUPT);
        match tokio::time::timeout(STOP_GRACE, child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                let _ = child.kill().await;
            }
        }
    }

    async fn periodic_loop(&self, every: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // the immediate first tick
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = ticker.tick() => self.request_restart("periodic"),
            }
        }
    }

    fn clear_child(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.child_pid = None;
    }

    /// Best-effort signal to the current child; a missed signal means the
    /// child already exited and the wait phase is handling it.
    fn signal_child(&self, signal: Signal) {
        let pid = self
            .inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .child_pid;
        if let Some(pid) = pid {
            let _ = kill(Pid::from_raw(pid), signal);
        }
    }
}

/// Graceful cycle signal sent by restart triggers.
const TERMINATE: Signal = Signal::SIGTERM;
/// Graceful stop signal; escalates to SIGKILL after [`STOP_GRACE`].
const INTERRUPT: Signal = Signal::SIGINT;

async fn drain<R>(stream: R, ring: Option<Arc<LineRing>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(ring) = &ring {
            ring.add(line);
        }
    }
}

fn format_exit(status: &std::process::ExitStatus) -> String {
    match status.code() {
        Some(0) => "exit code 0".to_string(),
        Some(code) => format!("exit code {code} ({status})"),
        None => format!("exit code -1 ({status})"),
    }
}

/// Last two buffered stderr lines joined with `" | "`, cut to 200 chars.
fn stderr_summary(ring: &LineRing) -> String {
    let lines = ring.lines();
    if lines.is_empty() {
        return String::new();
    }
    let start = lines.len().saturating_sub(2);
    let summary = lines[start..].join(" | ");
    if summary.chars().count() > SUMMARY_MAX_CHARS {
        summary.chars().take(SUMMARY_MAX_CHARS).collect()
    } else {
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_supervisor() -> Supervisor {
        let mut cfg = Config::default();
        cfg.ssh.user = "deploy".to_string();
        cfg.ssh.host = "bastion".to_string();
        cfg.ssh.remote_forward = "8080:localhost:22".to_string();
        Supervisor::new(cfg, ForwardMode::Remote, Vec::new())
    }

    #[test]
    fn trigger_ignored_unless_connected() {
        let sup = test_supervisor();
        sup.request_restart("network change");
        let snap = sup.snapshot();
        assert!(snap.last_trigger_at.is_none());
        assert!(snap.last_trigger_reason.is_empty());
    }

    #[test]
    fn add_forward_appends_and_deduplicates() {
        let sup = test_supervisor();
        assert!(sup.add_remote_forward(" 9090:localhost:80 ").unwrap());
        assert_eq!(
            sup.forwards(),
            vec!["8080:localhost:22", "9090:localhost:80"]
        );
        assert!(!sup.add_remote_forward("9090:localhost:80").unwrap());
        assert!(sup.add_remote_forward("").is_err());
    }

    #[test]
    fn remove_forward_refuses_to_empty_the_set() {
        let sup = test_supervisor();
        assert!(!sup.remove_remote_forward("not-there").unwrap());
        assert!(sup.remove_remote_forward("8080:localhost:22").is_err());

        sup.add_remote_forward("9090:localhost:80").unwrap();
        assert!(sup.remove_remote_forward("8080:localhost:22").unwrap());
        assert_eq!(sup.forwards(), vec!["9090:localhost:80"]);
    }

    #[test]
    fn clear_forwards_requests_stop() {
        let sup = test_supervisor();
        assert!(sup.clear_remote_forwards());
        assert!(sup.forwards().is_empty());
        assert!(sup.stop.is_cancelled());
        // second clear is a no-op on an already empty set
        assert!(!sup.clear_remote_forwards());
    }

    #[test]
    fn request_stop_is_idempotent() {
        let sup = test_supervisor();
        sup.request_stop();
        sup.request_stop();
        assert!(sup.stop.is_cancelled());
    }

    #[test]
    fn summary_joins_last_two_lines() {
        let ring = LineRing::new(10);
        assert_eq!(stderr_summary(&ring), "");
        ring.add("one");
        assert_eq!(stderr_summary(&ring), "one");
        ring.add("two");
        ring.add("three");
        assert_eq!(stderr_summary(&ring), "two | three");
    }

    #[test]
    fn summary_truncates_long_output() {
        let ring = LineRing::new(10);
        ring.add("x".repeat(300));
        assert_eq!(stderr_summary(&ring).chars().count(), SUMMARY_MAX_CHARS);
    }
}
