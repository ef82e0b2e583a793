//! # Bounded FIFO of recent text lines.
//!
//! [`LineRing`] backs two consumers: the supervisor's per-spawn stderr
//! buffer (capacity 10, feeds exit classification) and the logger's ring of
//! recent records (capacity 200, served over the control socket).

use std::collections::VecDeque;
use std::sync::Mutex;

/// Thread-safe bounded line buffer; inserting past capacity evicts the
/// oldest line. Capacity 0 disables storage entirely.
#[derive(Debug)]
pub struct LineRing {
    cap: usize,
    lines: Mutex<VecDeque<String>>,
}

impl LineRing {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            lines: Mutex::new(VecDeque::with_capacity(cap)),
        }
    }

    /// Appends a line, dropping the oldest when full.
    pub fn add(&self, line: impl Into<String>) {
        if self.cap == 0 {
            return;
        }
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        while lines.len() >= self.cap {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Returns a snapshot copy in insertion order.
    pub fn lines(&self) -> Vec<String> {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.iter().cloned().collect()
    }

    /// Lowercased newline-join of the current snapshot, for substring
    /// matching by the exit classifier.
    pub fn joined_lowercase(&self) -> String {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase()
    }

    pub fn is_empty(&self) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }
}
