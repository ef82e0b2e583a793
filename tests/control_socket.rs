//! Control socket against a live supervisor: status reflects the running
//! tunnel, mutations cycle it, and `stop` shuts the whole thing down.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;

use rpa::config::RestartConfig;
use rpa::{Config, ControlServer, ForwardMode, Logger, State, Supervisor};

fn write_script(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("fake-ssh");
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

async fn wait_for(mut cond: impl FnMut() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn status_mutation_and_stop_against_live_agent() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        "#!/bin/sh\ntrap 'exit 0' TERM INT\nsleep 5 &\nwait $!\nexit 0\n",
    );

    let mut cfg = Config::default();
    cfg.ssh.user = "deploy".to_string();
    cfg.ssh.host = "bastion".to_string();
    cfg.ssh.program = script.to_string_lossy().into_owned();
    cfg.ssh.remote_forward = "8080:localhost:22".to_string();
    cfg.agent.sleep_check_sec = 0;
    cfg.agent.network_poll_sec = 0;
    cfg.agent.restart = RestartConfig {
        min_delay_ms: 50,
        max_delay_ms: 200,
        factor: 2.0,
        jitter: 0.0,
        debounce_ms: 0,
    };

    let logger = Arc::new(Logger::new(dir.path().join("agent.log")).unwrap());
    let sup = Arc::new(Supervisor::new(cfg, ForwardMode::Remote, Vec::new()));
    let socket = dir.path().join("agent.sock");
    let server = ControlServer::new(socket.clone(), Arc::clone(&sup), Arc::clone(&logger));
    server.start().unwrap();

    let handle = tokio::spawn(Arc::clone(&sup).run());
    wait_for(|| sup.state() == State::Connected, "connect").await;

    let resp = rpa::ipc::query(&socket, "status", None).await.unwrap();
    assert!(resp.ok);
    let data = resp.data.unwrap();
    assert_eq!(data["state"], "CONNECTED");
    assert!(data.contains_key("last_success_unix"));

    let resp = rpa::ipc::query(&socket, "add_forward", Some("9090:localhost:80".into()))
        .await
        .unwrap();
    assert!(resp.ok);
    assert_eq!(sup.forwards(), vec!["8080:localhost:22", "9090:localhost:80"]);
    wait_for(|| sup.snapshot().start_success >= 2, "cycle after add").await;

    let resp = rpa::ipc::query(&socket, "stop", None).await.unwrap();
    assert!(resp.ok);
    assert_eq!(resp.message.as_deref(), Some("stopping"));

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("stop command should end the run")
        .unwrap()
        .unwrap();
    assert_eq!(sup.state(), State::Stopped);

    server.stop();
    assert!(!socket.exists());
}
