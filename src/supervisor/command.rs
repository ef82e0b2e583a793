//! # Child command construction.
//!
//! Turns the config plus the current forward list into the argv for the
//! external ssh client. The forward flag is the only role asymmetry in the
//! whole supervisor: agents publish with `-R`, clients consume with `-L`.

use crate::config::{expand_home, Config};
use crate::error::ConfigError;

/// Which side of the bastion this process maintains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForwardMode {
    /// Remote forwards (`-R`): expose local services through the bastion.
    Remote,
    /// Local forwards (`-L`): reach services through the bastion.
    Local,
}

impl ForwardMode {
    pub fn flag(&self) -> &'static str {
        match self {
            ForwardMode::Remote => "-R",
            ForwardMode::Local => "-L",
        }
    }
}

/// Program and argv ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Builds the ssh argv from config and the canonical forward list.
///
/// The config itself is validated once before the supervisor loop starts;
/// here only the mutable part (the forward set) is re-checked, since
/// control-surface mutations may have changed it since the last spawn.
pub fn build_ssh_command(
    cfg: &Config,
    mode: ForwardMode,
    forwards: &[String],
) -> Result<SshCommand, ConfigError> {
    if !forwards.iter().any(|f| !f.trim().is_empty()) {
        return Err(ConfigError::Missing {
            field: "ssh.remote_forward or ssh.remote_forwards",
        });
    }

    let mut args: Vec<String> = vec![
        "-N".into(),
        "-T".into(),
        "-o".into(),
        "ExitOnForwardFailure=yes".into(),
        "-o".into(),
        "BatchMode=yes".into(),
    ];

    for forward in forwards {
        if forward.trim().is_empty() {
            continue;
        }
        args.push(mode.flag().into());
        args.push(forward.clone());
    }

    if !cfg.ssh.identity_file.is_empty() {
        args.push("-i".into());
        args.push(
            expand_home(&cfg.ssh.identity_file)?
                .to_string_lossy()
                .into_owned(),
        );
    }

    for opt in &cfg.ssh.options {
        if opt.trim().is_empty() {
            continue;
        }
        args.push("-o".into());
        args.push(opt.clone());
    }

    if cfg.ssh.port > 0 {
        args.push("-p".into());
        args.push(cfg.ssh.port.to_string());
    }

    if cfg.ssh.user.is_empty() {
        args.push(cfg.ssh.host.clone());
    } else {
        args.push(format!("{}@{}", cfg.ssh.user, cfg.ssh.host));
    }

    let program = if cfg.ssh.program.is_empty() {
        "ssh".to_string()
    } else {
        cfg.ssh.program.clone()
    };

    Ok(SshCommand { program, args })
}
