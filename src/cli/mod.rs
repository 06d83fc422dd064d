//! CLI commands for swarmrunner using clap.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::agent::{generate_name, run_agent};
use crate::config::{ClientConfig, ServerConfig};
use crate::web::run_server;

/// swarmrunner - long-poll command coordinator for a fleet of shell agents.
#[derive(Parser, Debug)]
#[command(name = "swarmrunner")]
#[command(version)]
#[command(about = "Dispatch shell commands to remote agents over long-polling", long_about = None)]
pub struct Commands {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the coordinator
    Server {
        /// JSON config file
        #[arg(long, env = "SWARMRUNNER_CONFIG")]
        config: Option<PathBuf>,

        /// Address to bind
        #[arg(long, env = "SWARMRUNNER_BIND")]
        bind: Option<String>,

        /// Port to listen on
        #[arg(long, env = "SWARMRUNNER_PORT")]
        port: Option<u16>,

        /// Seconds a poll waits for a command
        #[arg(long, env = "SWARMRUNNER_POLL_TIMEOUT")]
        poll_timeout: Option<u64>,

        /// Seconds without a poll before an agent is evicted
        #[arg(long, env = "SWARMRUNNER_LIVENESS_INTERVAL")]
        liveness_interval: Option<u64>,

        /// Directory served for unmatched requests
        #[arg(long, env = "SWARMRUNNER_STATIC_DIR")]
        static_dir: Option<PathBuf>,

        /// Log directory
        #[arg(long, env = "SWARMRUNNER_LOG_DIR")]
        log_dir: Option<PathBuf>,
    },

    /// Run an agent that executes commands from a coordinator
    Client {
        /// Coordinator address (host:port)
        netloc: String,

        /// Agent name (generated if omitted)
        #[arg(long, env = "SWARMRUNNER_NAME")]
        name: Option<String>,

        /// JSON config file
        #[arg(long, env = "SWARMRUNNER_CONFIG")]
        config: Option<PathBuf>,

        /// Interpreter for received commands
        #[arg(long, env = "SWARMRUNNER_SHELL")]
        shell: Option<PathBuf>,

        /// Log directory
        #[arg(long, env = "SWARMRUNNER_LOG_DIR")]
        log_dir: Option<PathBuf>,
    },
}

/// Fully resolved invocation, ready to run.
#[derive(Debug)]
pub enum Invocation {
    Server(ServerConfig),
    Client {
        netloc: String,
        name: String,
        config: ClientConfig,
    },
}

impl Invocation {
    pub fn log_dir(&self) -> Option<&std::path::Path> {
        match self {
            Invocation::Server(config) => config.log_dir.as_deref(),
            Invocation::Client { config, .. } => config.log_dir.as_deref(),
        }
    }

    /// Base name of the log file for this role.
    pub fn log_stem(&self) -> &'static str {
        match self {
            Invocation::Server(_) => "server",
            Invocation::Client { .. } => "client",
        }
    }

    pub async fn run(self) -> Result<()> {
        match self {
            Invocation::Server(config) => run_server(config)
                .await
                .context("Coordinator failed"),
            Invocation::Client {
                netloc,
                name,
                config,
            } => run_agent(&netloc, name, config).await,
        }
    }
}

impl Commands {
    /// Merge config files and flags into an [`Invocation`].
    pub fn resolve(self) -> Result<Invocation> {
        match self.command {
            Command::Server {
                config,
                bind,
                port,
                poll_timeout,
                liveness_interval,
                static_dir,
                log_dir,
            } => {
                let mut settings = match config {
                    Some(path) => ServerConfig::load(&path)
                        .with_context(|| format!("Failed to load {}", path.display()))?,
                    None => ServerConfig::default(),
                };
                if let Some(bind) = bind {
                    settings.bind = bind;
                }
                if let Some(port) = port {
                    settings.port = port;
                }
                if let Some(secs) = poll_timeout {
                    settings.poll_timeout_secs = secs;
                }
                if let Some(secs) = liveness_interval {
                    settings.liveness_interval_secs = secs;
                }
                if static_dir.is_some() {
                    settings.static_dir = static_dir;
                }
                if log_dir.is_some() {
                    settings.log_dir = log_dir;
                }
                settings.validate()?;
                Ok(Invocation::Server(settings))
            }
            Command::Client {
                netloc,
                name,
                config,
                shell,
                log_dir,
            } => {
                let mut settings = match config {
                    Some(path) => ClientConfig::load(&path)
                        .with_context(|| format!("Failed to load {}", path.display()))?,
                    None => ClientConfig::default(),
                };
                if let Some(shell) = shell {
                    settings.shell = shell;
                }
                if log_dir.is_some() {
                    settings.log_dir = log_dir;
                }
                Ok(Invocation::Client {
                    netloc,
                    name: name.unwrap_or_else(generate_name),
                    config: settings,
                })
            }
        }
    }
}
