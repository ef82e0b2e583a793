//! End-to-end supervisor scenarios against fake child scripts.
//!
//! The `ssh.program` override points at shell scripts that imitate the ssh
//! client: sleeping while "connected", trapping the graceful signals,
//! printing auth failures, or recording their argv.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::time::sleep;

use rpa::config::RestartConfig;
use rpa::{Config, Event, EventKind, ForwardMode, State, Supervisor};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Config with monitors disabled and fast, deterministic backoff.
fn scenario_config(program: &Path, forwards: &[&str]) -> Config {
    let mut cfg = Config::default();
    cfg.ssh.user = "deploy".to_string();
    cfg.ssh.host = "bastion".to_string();
    cfg.ssh.program = program.to_string_lossy().into_owned();
    cfg.set_forwards(&forwards.iter().map(|f| f.to_string()).collect::<Vec<_>>());
    cfg.agent.sleep_check_sec = 0;
    cfg.agent.network_poll_sec = 0;
    cfg.agent.periodic_restart_sec = 0;
    cfg.agent.restart = RestartConfig {
        min_delay_ms: 100,
        max_delay_ms: 800,
        factor: 2.0,
        jitter: 0.0,
        debounce_ms: 0,
    };
    cfg
}

fn collect_events(sup: &Supervisor) -> Arc<Mutex<Vec<Event>>> {
    let store = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&store);
    let mut rx = sup.bus().subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => sink.lock().unwrap().push(ev),
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    });
    store
}

async fn wait_for(mut cond: impl FnMut() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(10)).await;
    }
}

fn count(events: &Arc<Mutex<Vec<Event>>>, kind: EventKind) -> usize {
    events.lock().unwrap().iter().filter(|e| e.kind == kind).count()
}

/// A child that holds the tunnel open and exits 0 on the graceful signals.
const WELL_BEHAVED: &str = "#!/bin/sh\ntrap 'exit 0' TERM INT\nsleep 5 &\nwait $!\nexit 0\n";

#[tokio::test]
async fn clean_restart_on_network_change() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "fake-ssh",
        "#!/bin/sh\ntrap 'exit 0' TERM INT\nsleep 1 &\nwait $!\nexit 0\n",
    );
    let cfg = scenario_config(&script, &["8080:localhost:22"]);
    let sup = Arc::new(Supervisor::new(cfg, ForwardMode::Remote, Vec::new()));
    let events = collect_events(&sup);
    let handle = tokio::spawn(Arc::clone(&sup).run());

    wait_for(|| sup.state() == State::Connected, "first connect").await;
    sleep(Duration::from_millis(500)).await;
    sup.request_restart("network change");

    wait_for(|| sup.snapshot().start_success >= 2, "respawn").await;
    sup.request_stop();
    handle.await.unwrap().unwrap();

    let events = events.lock().unwrap();
    let triggered: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::RestartTriggered)
        .collect();
    assert_eq!(triggered.len(), 1);
    assert_eq!(triggered[0].reason.as_deref(), Some("network change"));

    assert!(events
        .iter()
        .any(|e| e.kind == EventKind::SshExited && e.class.as_deref() == Some("clean")));

    // Clean exit resets the backoff: the delay before the respawn is min.
    let scheduled: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::RestartScheduled)
        .collect();
    assert!(!scheduled.is_empty());
    assert_eq!(scheduled[0].delay, Some(Duration::from_millis(100)));
}

#[tokio::test]
async fn auth_failure_halts_supervisor() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "fake-ssh",
        "#!/bin/sh\necho 'Permission denied (publickey).' 1>&2\nexit 255\n",
    );
    let cfg = scenario_config(&script, &["8080:localhost:22"]);
    let sup = Arc::new(Supervisor::new(cfg, ForwardMode::Remote, Vec::new()));
    let events = collect_events(&sup);
    let handle = tokio::spawn(Arc::clone(&sup).run());

    // Terminal class: the run returns on its own, no stop request needed.
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("supervisor should halt on auth failure")
        .unwrap()
        .unwrap();

    let snap = sup.snapshot();
    assert_eq!(snap.last_class, "auth");
    assert_eq!(snap.restart_count, 0);
    assert_eq!(sup.state(), State::Stopped);

    let events = events.lock().unwrap();
    let exited: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::SshExited)
        .collect();
    assert_eq!(exited.len(), 1);
    assert_eq!(exited[0].class.as_deref(), Some("auth"));
    assert!(exited[0]
        .stderr
        .as_deref()
        .unwrap()
        .contains("Permission denied"));
    assert_eq!(
        events
            .iter()
            .filter(|e| e.kind == EventKind::RestartScheduled)
            .count(),
        0
    );
}

#[tokio::test]
async fn debounced_trigger_burst() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "fake-ssh", WELL_BEHAVED);
    let mut cfg = scenario_config(&script, &["8080:localhost:22"]);
    cfg.agent.restart.debounce_ms = 1000;
    let sup = Arc::new(Supervisor::new(cfg, ForwardMode::Remote, Vec::new()));
    let events = collect_events(&sup);
    let handle = tokio::spawn(Arc::clone(&sup).run());

    wait_for(|| sup.state() == State::Connected, "connect").await;

    // The test runtime is single-threaded, so this burst lands before the
    // supervisor observes the first signal's effect.
    sup.request_restart("sleep");
    sup.request_restart("wake");
    sup.request_restart("network change");

    wait_for(|| count(&events, EventKind::RestartSkipped) == 2, "debounce").await;
    sup.request_stop();
    handle.await.unwrap().unwrap();

    let events = events.lock().unwrap();
    let triggered: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::RestartTriggered)
        .collect();
    assert_eq!(triggered.len(), 1);
    assert_eq!(triggered[0].reason.as_deref(), Some("sleep"));

    let skipped: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::RestartSkipped)
        .collect();
    assert_eq!(skipped.len(), 2);
    assert!(skipped
        .iter()
        .all(|e| e.detail.as_deref() == Some("debounced")));
    let reasons: Vec<_> = skipped.iter().map(|e| e.reason.as_deref().unwrap()).collect();
    assert_eq!(reasons, vec!["wake", "network change"]);
}

#[tokio::test]
async fn backoff_grows_and_caps_across_failed_spawns() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("no-such-ssh");
    let mut cfg = scenario_config(&missing, &["8080:localhost:22"]);
    cfg.agent.restart.max_delay_ms = 400;
    let sup = Arc::new(Supervisor::new(cfg, ForwardMode::Remote, Vec::new()));
    let events = collect_events(&sup);
    let handle = tokio::spawn(Arc::clone(&sup).run());

    wait_for(
        || count(&events, EventKind::RestartScheduled) >= 5,
        "five failed spawns",
    )
    .await;
    sup.request_stop();
    handle.await.unwrap().unwrap();

    let events_guard = events.lock().unwrap();
    let delays: Vec<u64> = events_guard
        .iter()
        .filter(|e| e.kind == EventKind::RestartScheduled)
        .filter_map(|e| e.delay)
        .map(|d| d.as_millis() as u64)
        .take(5)
        .collect();
    assert_eq!(delays, vec![100, 200, 400, 400, 400]);
    drop(events_guard);

    let snap = sup.snapshot();
    assert!(snap.start_failure >= 5);
    assert_eq!(snap.start_success, 0);
    assert!(snap.last_exit.starts_with("start failed:"));
    assert_eq!(snap.last_trigger_reason, "start failed");
    assert!(count(&events, EventKind::SshStartFailed) >= 5);
}

#[tokio::test]
async fn forward_add_while_running_cycles_with_new_argv() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "fake-ssh",
        "#!/bin/sh\nprintf '%s ' \"$@\" >> \"$(dirname \"$0\")/argv.log\"\nprintf '\\n' >> \"$(dirname \"$0\")/argv.log\"\ntrap 'exit 0' TERM INT\nsleep 5 &\nwait $!\nexit 0\n",
    );
    let cfg = scenario_config(&script, &["A"]);
    let sup = Arc::new(Supervisor::new(cfg, ForwardMode::Remote, Vec::new()));
    let events = collect_events(&sup);
    let handle = tokio::spawn(Arc::clone(&sup).run());

    wait_for(|| sup.state() == State::Connected, "connect").await;
    assert!(sup.add_remote_forward("B").unwrap());
    assert_eq!(sup.forwards(), vec!["A", "B"]);

    wait_for(|| sup.snapshot().start_success >= 2, "respawn").await;
    sup.request_stop();
    handle.await.unwrap().unwrap();

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| {
        e.kind == EventKind::RestartTriggered
            && e.reason.as_deref() == Some("remote forward added")
    }));

    let log = std::fs::read_to_string(dir.path().join("argv.log")).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert!(lines.len() >= 2);
    assert!(lines[0].contains("-R A "));
    assert!(!lines[0].contains("-R B"));
    assert!(lines[1].contains("-R A -R B"));
}

#[tokio::test]
async fn clear_forwards_stops_instead_of_restarting() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "fake-ssh", WELL_BEHAVED);
    let cfg = scenario_config(&script, &["A", "B"]);
    let sup = Arc::new(Supervisor::new(cfg, ForwardMode::Remote, Vec::new()));
    let events = collect_events(&sup);
    let handle = tokio::spawn(Arc::clone(&sup).run());

    wait_for(|| sup.state() == State::Connected, "connect").await;
    assert!(sup.clear_remote_forwards());

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("clear should stop the supervisor")
        .unwrap()
        .unwrap();

    assert_eq!(sup.state(), State::Stopped);
    assert!(sup.forwards().is_empty());

    let events = events.lock().unwrap();
    assert_eq!(
        events
            .iter()
            .filter(|e| e.kind == EventKind::RestartTriggered)
            .count(),
        0
    );
    assert!(events.iter().any(|e| e.kind == EventKind::StopRequested));
}

#[tokio::test]
async fn on_failure_policy_declines_clean_exit() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "fake-ssh", "#!/bin/sh\nexit 0\n");
    let mut cfg = scenario_config(&script, &["8080:localhost:22"]);
    cfg.agent.restart_policy = "on-failure".to_string();
    let sup = Arc::new(Supervisor::new(cfg, ForwardMode::Remote, Vec::new()));
    let handle = tokio::spawn(Arc::clone(&sup).run());

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("on-failure should not respawn after a clean exit")
        .unwrap()
        .unwrap();

    let snap = sup.snapshot();
    assert_eq!(snap.last_class, "clean");
    assert_eq!(snap.exit_success, 1);
    assert_eq!(snap.restart_count, 0);
}
