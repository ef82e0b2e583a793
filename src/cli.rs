//! # Command-line interface.
//!
//! `rpa run` starts the supervisor in the foreground; every other command
//! talks to the running agent over the control socket. The forward
//! mutation commands additionally persist the change to the config file so
//! it survives the next agent start.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{self, Config};
use crate::ipc::{self, ControlServer, Response};
use crate::logging::Logger;
use crate::signals;
use crate::subscribers::{JsonLogWriter, Subscribe};
use crate::supervisor::{ForwardMode, Supervisor};

#[derive(Parser)]
#[command(name = "rpa", version, about = "Persistent SSH tunnel supervisor")]
pub struct Cli {
    /// Path to the YAML config file (default: ~/.rpa/config.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tunnel supervisor in the foreground.
    Run {
        /// Which side of the bastion this process maintains.
        #[arg(long, value_enum, default_value = "agent")]
        role: Role,
    },
    /// Show the running agent's status.
    Status,
    /// Show counters in a metrics-friendly form.
    Metrics,
    /// Dump the agent's recent log records.
    Logs,
    /// Ask the running agent to stop.
    Stop,
    /// Add a forward to the running agent and persist it.
    AddForward { forward: String },
    /// Remove a forward from the running agent and persist the removal.
    RemoveForward { forward: String },
    /// Clear all forwards; the agent stops.
    ClearForwards,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Role {
    /// Maintain remote forwards (`-R`) through the bastion.
    Agent,
    /// Maintain local forwards (`-L`) through the bastion.
    Client,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };

    match cli.command {
        Commands::Run { role } => run_agent(&config_path, role).await,
        Commands::Status => {
            let data = expect_data(control("status", None).await?)?;
            for (key, value) in data {
                println!("{key}: {value}");
            }
            Ok(())
        }
        Commands::Metrics => {
            let data = expect_data(control("metrics", None).await?)?;
            for (key, value) in data {
                println!("{key} {value}");
            }
            Ok(())
        }
        Commands::Logs => {
            let resp = ensure_ok(control("logs", None).await?)?;
            for line in resp.logs.unwrap_or_default() {
                println!("{line}");
            }
            Ok(())
        }
        Commands::Stop => {
            let resp = ensure_ok(control("stop", None).await?)?;
            println!("{}", resp.message.unwrap_or_else(|| "stopping".to_string()));
            Ok(())
        }
        Commands::AddForward { forward } => {
            ensure_ok(control("add_forward", Some(forward.clone())).await?)?;
            persist_forwards(&config_path, |forwards| {
                let trimmed = forward.trim().to_string();
                if !forwards.iter().any(|have| *have == trimmed) {
                    forwards.push(trimmed);
                }
            })?;
            println!("forward added");
            Ok(())
        }
        Commands::RemoveForward { forward } => {
            ensure_ok(control("remove_forward", Some(forward.clone())).await?)?;
            persist_forwards(&config_path, |forwards| {
                forwards.retain(|have| have != forward.trim());
            })?;
            println!("forward removed");
            Ok(())
        }
        Commands::ClearForwards => {
            let resp = ensure_ok(control("clear_forwards", None).await?)?;
            persist_forwards(&config_path, |forwards| forwards.clear())?;
            println!(
                "{}",
                resp.message.unwrap_or_else(|| "forwards cleared".to_string())
            );
            Ok(())
        }
    }
}

async fn run_agent(config_path: &Path, role: Role) -> anyhow::Result<()> {
    let cfg = Config::load(config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;
    cfg.validate()?;

    let logger = Arc::new(Logger::new(cfg.log_path()?)?);
    let mode = match role {
        Role::Agent => ForwardMode::Remote,
        Role::Client => ForwardMode::Local,
    };
    let writer: Arc<dyn Subscribe> = Arc::new(JsonLogWriter::new(Arc::clone(&logger)));
    let supervisor = Arc::new(Supervisor::new(cfg, mode, vec![writer]));

    let server = ControlServer::new(
        config::socket_path()?,
        Arc::clone(&supervisor),
        Arc::clone(&logger),
    );
    server.start().context("start control socket")?;

    {
        let sup = Arc::clone(&supervisor);
        tokio::spawn(async move {
            if signals::wait_for_shutdown_signal().await.is_ok() {
                sup.request_stop();
            }
        });
    }

    let result = Arc::clone(&supervisor).run().await;
    server.stop();
    result?;
    Ok(())
}

async fn control(command: &str, forward: Option<String>) -> anyhow::Result<Response> {
    let socket = config::socket_path()?;
    ipc::query(&socket, command, forward)
        .await
        .with_context(|| format!("connect to agent at {}", socket.display()))
}

fn ensure_ok(resp: Response) -> anyhow::Result<Response> {
    if !resp.ok {
        bail!(
            "{}",
            resp.message.unwrap_or_else(|| "request failed".to_string())
        );
    }
    Ok(resp)
}

fn expect_data(
    resp: Response,
) -> anyhow::Result<std::collections::BTreeMap<String, String>> {
    let resp = ensure_ok(resp)?;
    Ok(resp.data.unwrap_or_default())
}

fn persist_forwards(
    config_path: &Path,
    mutate: impl FnOnce(&mut Vec<String>),
) -> anyhow::Result<()> {
    let mut cfg = Config::load(config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;
    let mut forwards = cfg.normalize_forwards();
    mutate(&mut forwards);
    cfg.set_forwards(&forwards);
    cfg.save(config_path)
        .with_context(|| format!("save config {}", config_path.display()))?;
    Ok(())
}
