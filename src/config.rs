//! Configuration loading for swarmrunner.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Default log directory (platform data dir + `logs`).
pub fn default_log_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "swarmrunner", "swarmrunner")
        .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;

    Ok(dirs.data_dir().join("logs"))
}

/// Read a JSON config file. A missing file yields the defaults.
fn load_json<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if !path.exists() {
        tracing::warn!("Config file {} not found, using defaults", path.display());
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = serde_json::from_str(&content)?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Upper bound for both the poll timeout and the liveness interval.
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// How long a poll waits for a command before answering 408.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// How long an agent may go without polling before it is evicted.
    #[serde(default = "default_liveness_interval_secs")]
    pub liveness_interval_secs: u64,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Directory served for unmatched GET requests (web UI).
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8800
}

fn default_poll_timeout_secs() -> u64 {
    60
}

fn default_liveness_interval_secs() -> u64 {
    120
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            poll_timeout_secs: default_poll_timeout_secs(),
            liveness_interval_secs: default_liveness_interval_secs(),
            max_body_bytes: default_max_body_bytes(),
            static_dir: None,
            log_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        if self.poll_timeout_secs == 0 || self.liveness_interval_secs == 0 {
            return Err(Error::Config(
                "poll_timeout_secs and liveness_interval_secs must be non-zero".to_string(),
            ));
        }
        if self.poll_timeout_secs > MAX_TIMEOUT_SECS
            || self.liveness_interval_secs > MAX_TIMEOUT_SECS
        {
            return Err(Error::Config(format!(
                "poll_timeout_secs and liveness_interval_secs must not exceed {}",
                MAX_TIMEOUT_SECS
            )));
        }
        // An agent blocked in a poll must not be evicted mid-wait.
        if self.liveness_interval_secs <= self.poll_timeout_secs {
            return Err(Error::Config(format!(
                "liveness_interval_secs ({}) must exceed poll_timeout_secs ({})",
                self.liveness_interval_secs, self.poll_timeout_secs
            )));
        }
        if self.max_body_bytes == 0 {
            return Err(Error::Config("max_body_bytes must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Agent-side configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ClientConfig {
    /// Interpreter each received command is handed to.
    #[serde(default = "default_shell")]
    pub shell: PathBuf,

    /// Delay before retrying after a transport error.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Connect timeout for every request and overall timeout for
    /// registration. Polls have no overall timeout since they block for the
    /// server's poll timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_shell() -> PathBuf {
    PathBuf::from("/bin/sh")
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    90
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            retry_delay_secs: default_retry_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            log_dir: None,
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
