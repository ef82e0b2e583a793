//! # YAML configuration: schema, defaults, validation, persistence.
//!
//! The persisted forward set is the union of one scalar field
//! (`ssh.remote_forward`) and one list field (`ssh.remote_forwards`); the
//! canonical in-memory form is a single ordered, de-duplicated list
//! produced by [`Config::normalize_forwards`]. [`Config::set_forwards`]
//! maps back: one forward writes the scalar only, several write the first
//! as scalar and the rest as list, none clears both.
//!
//! Defaults are applied at parse time via serde, so an explicitly
//! configured `0` (for example `network_poll_sec: 0` to disable the
//! monitor) survives loading.

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub ssh: SshConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub restart_policy: String,
    pub restart: RestartConfig,
    /// Cycle the tunnel every N seconds; 0 disables.
    pub periodic_restart_sec: u64,
    /// Sleep-monitor sample interval; 0 disables the monitor.
    pub sleep_check_sec: u64,
    /// Wall-clock gap that counts as a suspend/resume; 0 means twice the
    /// check interval.
    pub sleep_gap_sec: u64,
    /// Network-monitor poll interval; 0 disables the monitor.
    pub network_poll_sec: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "rpa-agent".to_string(),
            restart_policy: "always".to_string(),
            restart: RestartConfig::default(),
            periodic_restart_sec: 0,
            sleep_check_sec: 5,
            sleep_gap_sec: 30,
            network_poll_sec: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
    pub jitter: f64,
    pub debounce_ms: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 2000,
            max_delay_ms: 30000,
            factor: 2.0,
            jitter: 0.2,
            debounce_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub user: String,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remote_forward: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remote_forwards: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub identity_file: String,
    pub options: Vec<String>,
    /// Child program; override to pin a non-PATH ssh binary.
    pub program: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            host: String::new(),
            port: 22,
            remote_forward: String::new(),
            remote_forwards: Vec::new(),
            identity_file: String::new(),
            options: vec![
                "ServerAliveInterval=30".to_string(),
                "ServerAliveCountMax=3".to_string(),
            ],
            program: "ssh".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            path: "~/.rpa/logs/agent.log".to_string(),
        }
    }
}

impl Config {
    /// Loads and parses a config file; defaults fill any omitted field.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Serializes the config back to its file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let data = serde_yaml::to_string(self)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, data).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks required fields and bounds; called before the first spawn.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssh.host.trim().is_empty() {
            return Err(ConfigError::Missing { field: "ssh.host" });
        }
        if self.ssh.user.trim().is_empty() {
            return Err(ConfigError::Missing { field: "ssh.user" });
        }
        if self.normalize_forwards().is_empty() {
            return Err(ConfigError::Missing {
                field: "ssh.remote_forward or ssh.remote_forwards",
            });
        }
        if self.ssh.port == 0 {
            return Err(ConfigError::Invalid {
                field: "ssh.port",
                reason: "must be > 0".to_string(),
            });
        }
        match self.agent.restart_policy.to_ascii_lowercase().as_str() {
            "always" | "on-failure" => {}
            other => {
                return Err(ConfigError::Invalid {
                    field: "agent.restart_policy",
                    reason: format!("must be always or on-failure (got {other:?})"),
                });
            }
        }
        let restart = &self.agent.restart;
        if restart.max_delay_ms > 0 && restart.min_delay_ms > restart.max_delay_ms {
            return Err(ConfigError::Invalid {
                field: "agent.restart.min_delay_ms",
                reason: "must be <= max_delay_ms".to_string(),
            });
        }
        if restart.factor < 1.0 {
            return Err(ConfigError::Invalid {
                field: "agent.restart.factor",
                reason: "must be >= 1.0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&restart.jitter) {
            return Err(ConfigError::Invalid {
                field: "agent.restart.jitter",
                reason: "must be between 0 and 1".to_string(),
            });
        }
        Ok(())
    }

    /// Canonical forward list: `[scalar] ++ list`, trimmed, de-duplicated
    /// preserving first occurrence.
    pub fn normalize_forwards(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(1 + self.ssh.remote_forwards.len());
        let mut push = |value: &str| {
            let trimmed = value.trim();
            if trimmed.is_empty() || out.iter().any(|have| have == trimmed) {
                return;
            }
            out.push(trimmed.to_string());
        };
        push(&self.ssh.remote_forward);
        for value in &self.ssh.remote_forwards {
            push(value);
        }
        out
    }

    /// Writes the canonical list back into the persisted representation.
    pub fn set_forwards(&mut self, forwards: &[String]) {
        let mut trimmed: Vec<String> = Vec::with_capacity(forwards.len());
        for value in forwards {
            let value = value.trim();
            if value.is_empty() || trimmed.iter().any(|have| have == value) {
                continue;
            }
            trimmed.push(value.to_string());
        }
        match trimmed.len() {
            0 => {
                self.ssh.remote_forward.clear();
                self.ssh.remote_forwards.clear();
            }
            1 => {
                self.ssh.remote_forward = trimmed.remove(0);
                self.ssh.remote_forwards.clear();
            }
            _ => {
                self.ssh.remote_forward = trimmed.remove(0);
                self.ssh.remote_forwards = trimmed;
            }
        }
    }

    /// Endpoint summary for logs and status: `user@host:port`.
    pub fn summary(&self) -> String {
        format!("{}@{}:{}", self.ssh.user, self.ssh.host, self.ssh.port)
    }

    /// Expanded log file path.
    pub fn log_path(&self) -> Result<PathBuf, ConfigError> {
        expand_home(&self.logging.path)
    }
}

/// Well-known control socket path under the user's home.
pub fn socket_path() -> Result<PathBuf, ConfigError> {
    Ok(home_dir()?.join(".rpa").join("agent.sock"))
}

/// Default config file location.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(home_dir()?.join(".rpa").join("config.yaml"))
}

/// Expands a leading `~` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf, ConfigError> {
    if path.is_empty() {
        return Err(ConfigError::Missing { field: "path" });
    }
    if path == "~" {
        return home_dir();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return Ok(home_dir()?.join(rest));
    }
    Ok(PathBuf::from(path))
}

fn home_dir() -> Result<PathBuf, ConfigError> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or(ConfigError::Home)
}
