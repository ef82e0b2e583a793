//! # Control socket: local observability and mutation surface.
//!
//! One JSON object per connection, line-framed. The request carries a
//! `command` plus an optional `forward` operand for the mutation commands;
//! the response is a single `{ok, message?, data?, logs?}` object.
//!
//! ```text
//! → {"command":"status"}
//! ← {"ok":true,"data":{"state":"CONNECTED","restarts":"3",...}}
//!
//! → {"command":"add_forward","forward":"8080:localhost:22"}
//! ← {"ok":true,"message":"forward added"}
//! ```

mod client;
mod server;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use client::query;
pub use server::ControlServer;

/// One request per connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub command: String,
    /// Operand for `add_forward` / `remove_forward`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward: Option<String>,
}

/// One response per connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
}

impl Response {
    fn ok_with_message(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }
}
