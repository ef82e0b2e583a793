//! # JSON log-writing subscriber.
//!
//! [`JsonLogWriter`] maps each [`Event`] to one structured record in the
//! [`Logger`]: the event kind becomes the `event` field, the attached
//! metadata becomes the record's extra fields.
//!
//! ```text
//! {"ts":"2025-11-02T09:14:03Z","level":"INFO","event":"restart_triggered","reason":"network change"}
//! {"ts":"2025-11-02T09:14:05Z","level":"ERROR","event":"ssh_exited","exit":"exit code 255 (...)","class":"refused"}
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::events::Event;
use crate::logging::Logger;
use crate::subscribers::Subscribe;

/// Renders runtime events as JSON log records.
pub struct JsonLogWriter {
    logger: Arc<Logger>,
}

impl JsonLogWriter {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl Subscribe for JsonLogWriter {
    async fn on_event(&self, ev: &Event) {
        let mut fields: Vec<(&str, String)> = Vec::new();
        if let Some(v) = &ev.summary {
            fields.push(("summary", v.clone()));
        }
        if let Some(v) = &ev.reason {
            fields.push(("reason", v.clone()));
        }
        if let Some(v) = &ev.detail {
            fields.push(("detail", v.clone()));
        }
        if let Some(v) = &ev.exit {
            fields.push(("exit", v.clone()));
        }
        if let Some(v) = &ev.class {
            fields.push(("class", v.clone()));
        }
        if let Some(v) = &ev.stderr {
            fields.push(("stderr", v.clone()));
        }
        if let Some(v) = &ev.error {
            fields.push(("error", v.clone()));
        }
        if let Some(v) = &ev.monitor {
            fields.push(("monitor", v.clone()));
        }
        if let Some(d) = ev.delay {
            fields.push(("delay_ms", d.as_millis().to_string()));
        }

        self.logger
            .event(ev.level(), ev.kind.name(), ev.msg.as_deref(), &fields);
    }

    fn name(&self) -> &'static str {
        "json_log_writer"
    }
}
