//! # Exit classification from recent stderr.
//!
//! Maps `(stderr ring, exit code)` to an [`ExitClass`]. The terminal
//! classes (`auth`, `hostkey`) indicate problems restarting cannot fix;
//! the supervisor halts on them and waits for a human.

use std::fmt;

use crate::lines::LineRing;

/// Why the child exited, as far as its stderr reveals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Clean,
    Auth,
    HostKey,
    Dns,
    Network,
    Refused,
    Timeout,
    Unknown,
}

impl ExitClass {
    /// Stable lowercase tag used in logs, status, and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitClass::Clean => "clean",
            ExitClass::Auth => "auth",
            ExitClass::HostKey => "hostkey",
            ExitClass::Dns => "dns",
            ExitClass::Network => "network",
            ExitClass::Refused => "refused",
            ExitClass::Timeout => "timeout",
            ExitClass::Unknown => "unknown",
        }
    }

    /// Terminal classes must not be restarted automatically.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExitClass::Auth | ExitClass::HostKey)
    }
}

impl fmt::Display for ExitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substring rules in match order; first hit wins.
const RULES: &[(&str, ExitClass)] = &[
    ("permission denied", ExitClass::Auth),
    ("host key verification failed", ExitClass::HostKey),
    ("could not resolve hostname", ExitClass::Dns),
    ("name or service not known", ExitClass::Dns),
    ("no route to host", ExitClass::Network),
    ("connection refused", ExitClass::Refused),
    ("operation timed out", ExitClass::Timeout),
];

/// Classifies a child exit from its buffered stderr.
///
/// `failed` is whether the exit status reported failure; a zero exit code
/// without failure is always [`ExitClass::Clean`] regardless of stderr.
pub fn classify(lines: &LineRing, exit_code: i32, failed: bool) -> ExitClass {
    if !failed && exit_code == 0 {
        return ExitClass::Clean;
    }
    let text = lines.joined_lowercase();
    for (needle, class) in RULES {
        if text.contains(needle) {
            return *class;
        }
    }
    ExitClass::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_with(lines: &[&str]) -> LineRing {
        let ring = LineRing::new(10);
        for line in lines {
            ring.add(*line);
        }
        ring
    }

    #[test]
    fn zero_exit_without_failure_is_clean() {
        let ring = ring_with(&["Connection to host closed."]);
        assert_eq!(classify(&ring, 0, false), ExitClass::Clean);
    }

    #[test]
    fn matches_known_substrings_case_insensitively() {
        let cases: &[(&str, ExitClass)] = &[
            ("Permission denied (publickey).", ExitClass::Auth),
            ("Host key verification failed.", ExitClass::HostKey),
            ("ssh: Could not resolve hostname bastion", ExitClass::Dns),
            ("Name or service not known", ExitClass::Dns),
            ("connect to host bastion port 22: No route to host", ExitClass::Network),
            ("connect to host bastion port 22: Connection refused", ExitClass::Refused),
            ("connect to host bastion port 22: Operation timed out", ExitClass::Timeout),
        ];
        for (line, expected) in cases {
            let ring = ring_with(&[line]);
            assert_eq!(classify(&ring, 255, true), *expected, "line: {line}");
        }
    }

    #[test]
    fn first_rule_wins_over_later_matches() {
        let ring = ring_with(&["Connection refused", "Permission denied"]);
        assert_eq!(classify(&ring, 255, true), ExitClass::Auth);
    }

    #[test]
    fn unmatched_failure_is_unknown() {
        let ring = ring_with(&["something unexpected"]);
        assert_eq!(classify(&ring, 1, true), ExitClass::Unknown);
        let empty = LineRing::new(10);
        assert_eq!(classify(&empty, -1, true), ExitClass::Unknown);
    }

    #[test]
    fn terminal_classes() {
        assert!(ExitClass::Auth.is_terminal());
        assert!(ExitClass::HostKey.is_terminal());
        assert!(!ExitClass::Refused.is_terminal());
        assert!(!ExitClass::Clean.is_terminal());
    }
}
