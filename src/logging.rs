//! # Structured file logger with an in-memory ring.
//!
//! [`Logger`] appends line-delimited JSON records
//! `{ts, level, event, msg?, ...fields}` to the configured log file and
//! mirrors every line into a 200-line [`LineRing`], which the control
//! socket serves for `logs` queries. `ts` is RFC3339 at second precision.
//!
//! Appends are best-effort: a log file that cannot be opened never takes
//! the tunnel down.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::AgentError;
use crate::lines::LineRing;

/// Number of recent records kept in memory for the control socket.
pub const LOG_RING_CAPACITY: usize = 200;

/// File-backed JSON-lines logger.
pub struct Logger {
    path: PathBuf,
    ring: Arc<LineRing>,
    file: Mutex<()>,
}

impl Logger {
    /// Creates a logger writing to `path`, creating parent directories.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| AgentError::Logging {
                path: path.clone(),
                source,
            })?;
        }
        Ok(Self {
            path,
            ring: Arc::new(LineRing::new(LOG_RING_CAPACITY)),
            file: Mutex::new(()),
        })
    }

    /// Free-form informational message.
    pub fn info(&self, msg: impl AsRef<str>) {
        self.write("INFO", "message", Some(msg.as_ref()), &[]);
    }

    /// Free-form error message.
    pub fn error(&self, msg: impl AsRef<str>) {
        self.write("ERROR", "message", Some(msg.as_ref()), &[]);
    }

    /// Structured event record with ordered fields.
    pub fn event(&self, level: &str, event: &str, msg: Option<&str>, fields: &[(&str, String)]) {
        self.write(level, event, msg, fields);
    }

    /// Snapshot of the recent-record ring, oldest first.
    pub fn recent(&self) -> Vec<String> {
        self.ring.lines()
    }

    fn write(&self, level: &str, event: &str, msg: Option<&str>, fields: &[(&str, String)]) {
        let mut record = Map::new();
        record.insert(
            "ts".into(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        record.insert("level".into(), Value::from(level));
        record.insert("event".into(), Value::from(event));
        if let Some(msg) = msg {
            record.insert("msg".into(), Value::from(msg));
        }
        for (key, value) in fields {
            record.insert((*key).into(), Value::from(value.as_str()));
        }

        let line = Value::Object(record).to_string();
        self.ring.add(&line);

        let _guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}
