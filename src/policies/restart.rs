//! # Restart policy for the supervised tunnel.
//!
//! [`RestartPolicy`] determines whether the child is respawned after it
//! exits. Terminal exit classes (`auth`, `hostkey`) override the policy and
//! always halt the supervisor.

/// Policy controlling whether the child is restarted after an exit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Restart unconditionally, regardless of exit status (default).
    Always,
    /// Restart only when the child exited unsuccessfully.
    OnFailure,
}

impl RestartPolicy {
    /// Parses a policy name; anything other than `"on-failure"` maps to
    /// [`RestartPolicy::Always`].
    pub fn from_name(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "on-failure" => RestartPolicy::OnFailure,
            _ => RestartPolicy::Always,
        }
    }

    /// Stable name, the inverse of [`RestartPolicy::from_name`].
    pub fn name(&self) -> &'static str {
        match self {
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
        }
    }

    /// Whether a child exit with the given cleanliness warrants a restart.
    pub fn should_restart(&self, clean_exit: bool) -> bool {
        match self {
            RestartPolicy::Always => true,
            RestartPolicy::OnFailure => !clean_exit,
        }
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::Always
    }
}
