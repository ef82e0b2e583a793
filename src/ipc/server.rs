//! # Unix-socket control server.
//!
//! Listens at the well-known socket under the user's home, mode 0600 in a
//! 0755 directory. Each accepted connection is served by a short-lived
//! task: read one request line, dispatch against supervisor snapshots,
//! write one response, close. `stop` responds first and requests the
//! supervisor stop after the response is on the wire.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use super::{Request, Response};
use crate::logging::Logger;
use crate::supervisor::Supervisor;

struct Shared {
    socket_path: PathBuf,
    supervisor: Arc<Supervisor>,
    logger: Arc<Logger>,
    started_at: Instant,
}

/// Accept loop plus per-connection handlers over a unix socket.
pub struct ControlServer {
    shared: Arc<Shared>,
    token: CancellationToken,
}

impl ControlServer {
    pub fn new(socket_path: PathBuf, supervisor: Arc<Supervisor>, logger: Arc<Logger>) -> Self {
        Self {
            shared: Arc::new(Shared {
                socket_path,
                supervisor,
                logger,
                started_at: Instant::now(),
            }),
            token: CancellationToken::new(),
        }
    }

    /// Binds the socket and spawns the accept loop.
    ///
    /// A stale socket file from a previous run is removed before binding.
    pub fn start(&self) -> io::Result<()> {
        let path = &self.shared.socket_path;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o755))?;
        }
        let _ = fs::remove_file(path);
        let listener = UnixListener::bind(path)?;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        let shared = Arc::clone(&self.shared);
        let token = self.token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _addr)) => {
                                let shared = Arc::clone(&shared);
                                tokio::spawn(handle_conn(stream, shared));
                            }
                            Err(_) => break,
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Stops accepting and removes the socket file.
    pub fn stop(&self) {
        self.token.cancel();
        let _ = fs::remove_file(&self.shared.socket_path);
    }
}

async fn handle_conn(stream: UnixStream, shared: Arc<Shared>) {
    let (reader, mut writer) = stream.into_split();
    let mut line = String::new();
    let mut reader = BufReader::new(reader);
    match reader.read_line(&mut line).await {
        Ok(0) | Err(_) => return,
        Ok(_) => {}
    }

    let (response, stop_after) = match serde_json::from_str::<Request>(line.trim()) {
        Err(_) => (Response::fail("invalid request"), false),
        Ok(req) => {
            let stop_after = req.command == "stop";
            (dispatch(&req, &shared), stop_after)
        }
    };

    let mut payload =
        serde_json::to_string(&response).unwrap_or_else(|_| r#"{"ok":false}"#.to_string());
    payload.push('\n');
    let _ = writer.write_all(payload.as_bytes()).await;
    let _ = writer.shutdown().await;

    if stop_after {
        shared.supervisor.request_stop();
    }
}

fn dispatch(req: &Request, shared: &Shared) -> Response {
    match req.command.as_str() {
        "status" => status(shared),
        "metrics" => metrics(shared),
        "logs" => Response {
            ok: true,
            logs: Some(shared.logger.recent()),
            ..Response::default()
        },
        "stop" => Response::ok_with_message("stopping"),
        "add_forward" => match required_forward(req) {
            Err(resp) => resp,
            Ok(forward) => match shared.supervisor.add_remote_forward(forward) {
                Ok(true) => Response::ok_with_message("forward added"),
                Ok(false) => Response::fail("forward already present"),
                Err(err) => Response::fail(err.to_string()),
            },
        },
        "remove_forward" => match required_forward(req) {
            Err(resp) => resp,
            Ok(forward) => match shared.supervisor.remove_remote_forward(forward) {
                Ok(true) => Response::ok_with_message("forward removed"),
                Ok(false) => Response::fail("forward not found"),
                Err(err) => Response::fail(err.to_string()),
            },
        },
        "clear_forwards" => {
            if shared.supervisor.clear_remote_forwards() {
                Response::ok_with_message("forwards cleared; stopping")
            } else {
                Response::fail("no forwards configured")
            }
        }
        _ => Response::fail("unknown command"),
    }
}

fn required_forward(req: &Request) -> Result<&str, Response> {
    match req.forward.as_deref() {
        Some(forward) if !forward.trim().is_empty() => Ok(forward),
        _ => Err(Response::fail("forward is required")),
    }
}

fn status(shared: &Shared) -> Response {
    let snap = shared.supervisor.snapshot();
    let mut data = std::collections::BTreeMap::new();
    data.insert("state".to_string(), snap.state.as_str().to_string());
    data.insert("summary".to_string(), snap.summary);
    data.insert(
        "uptime".to_string(),
        format_uptime(shared.started_at.elapsed()),
    );
    data.insert(
        "socket".to_string(),
        shared.socket_path.display().to_string(),
    );
    data.insert("restarts".to_string(), snap.restart_count.to_string());
    data.insert("last_exit".to_string(), snap.last_exit);
    data.insert("last_class".to_string(), snap.last_class);
    data.insert("last_trigger".to_string(), snap.last_trigger_reason);
    if let Some(at) = snap.last_success {
        if let Ok(unix) = at.duration_since(UNIX_EPOCH) {
            data.insert("last_success_unix".to_string(), unix.as_secs().to_string());
        }
    }
    if !snap.current_backoff.is_zero() {
        data.insert(
            "backoff_ms".to_string(),
            snap.current_backoff.as_millis().to_string(),
        );
    }
    Response {
        ok: true,
        data: Some(data),
        ..Response::default()
    }
}

fn metrics(shared: &Shared) -> Response {
    let snap = shared.supervisor.snapshot();
    let mut data = std::collections::BTreeMap::new();
    data.insert(
        "rpa_client_state".to_string(),
        snap.state.as_metric().to_string(),
    );
    data.insert(
        "rpa_client_restart_total".to_string(),
        snap.restart_count.to_string(),
    );
    data.insert(
        "rpa_client_uptime_sec".to_string(),
        shared.started_at.elapsed().as_secs().to_string(),
    );
    data.insert(
        "rpa_client_start_success_total".to_string(),
        snap.start_success.to_string(),
    );
    data.insert(
        "rpa_client_start_failure_total".to_string(),
        snap.start_failure.to_string(),
    );
    data.insert(
        "rpa_client_exit_success_total".to_string(),
        snap.exit_success.to_string(),
    );
    data.insert(
        "rpa_client_exit_failure_total".to_string(),
        snap.exit_failure.to_string(),
    );
    data.insert(
        "rpa_client_last_trigger".to_string(),
        snap.last_trigger_reason,
    );
    if let Some(at) = snap.last_success {
        if let Ok(unix) = at.duration_since(UNIX_EPOCH) {
            data.insert(
                "rpa_client_last_success_unix".to_string(),
                unix.as_secs().to_string(),
            );
        }
    }
    if !snap.current_backoff.is_zero() {
        data.insert(
            "rpa_client_backoff_ms".to_string(),
            snap.current_backoff.as_millis().to_string(),
        );
    }
    Response {
        ok: true,
        data: Some(data),
        ..Response::default()
    }
}

fn format_uptime(d: Duration) -> String {
    let total = d.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
