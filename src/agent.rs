//! Agent side of the protocol: register, long-poll, run each command as a
//! shell script, repeat.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, StatusCode};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::PollOutcome;
use crate::web::framing::TASK_ID_HEADER;

/// HTTP client bound to one agent name on one coordinator.
pub struct AgentClient {
    http: Client,
    base_url: String,
    name: String,
    session: Uuid,
    seq: AtomicU64,
    request_timeout: Duration,
}

impl AgentClient {
    pub fn new(netloc: &str, name: impl Into<String>, config: &ClientConfig) -> Result<Self> {
        // No overall timeout here: a poll legitimately blocks for as long as
        // the server's poll timeout, which the client does not know.
        let http = Client::builder()
            .connect_timeout(config.request_timeout())
            .build()?;

        let base_url = if netloc.starts_with("http://") || netloc.starts_with("https://") {
            netloc.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", netloc.trim_end_matches('/'))
        };

        Ok(Self {
            http,
            base_url,
            name: name.into(),
            session: Uuid::new_v4(),
            seq: AtomicU64::new(0),
            request_timeout: config.request_timeout(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// POST /register/:name with the environment snapshot as body.
    pub async fn register(&self, environment: String) -> Result<()> {
        let response = self
            .http
            .post(self.url("register"))
            .timeout(self.request_timeout)
            .header(TASK_ID_HEADER, self.next_task_id())
            .body(environment)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                tracing::info!(name = %self.name, "Registered with coordinator");
                Ok(())
            }
            StatusCode::CONFLICT => Err(Error::Conflict(self.name.clone())),
            status => Err(unexpected(status, response).await),
        }
    }

    /// GET /listen/:name; blocks for up to the server's poll timeout.
    pub async fn listen(&self) -> Result<PollOutcome> {
        let response = self
            .http
            .get(self.url("listen"))
            .header(TASK_ID_HEADER, self.next_task_id())
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(PollOutcome::Payload(response.bytes().await?)),
            StatusCode::REQUEST_TIMEOUT => Ok(PollOutcome::Timeout),
            StatusCode::NOT_FOUND => Err(Error::NotFound(self.name.clone())),
            status => Err(unexpected(status, response).await),
        }
    }

    fn url(&self, operation: &str) -> String {
        format!("{}/{}/{}", self.base_url, operation, self.name)
    }

    fn next_task_id(&self) -> String {
        format!("{}@{}", self.session, self.seq.fetch_add(1, Ordering::Relaxed))
    }
}

async fn unexpected(status: StatusCode, response: reqwest::Response) -> Error {
    let body = response.text().await.unwrap_or_default();
    Error::Unexpected(status.as_u16(), body.trim().to_string())
}

/// Name used when none is given on the command line.
pub fn generate_name() -> String {
    format!("agent-{}", ulid::Ulid::new().to_string().to_lowercase())
}

/// The current process environment as a JSON object.
pub fn environment_snapshot() -> Result<String> {
    let vars: BTreeMap<String, String> = std::env::vars_os()
        .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
        .collect();
    Ok(serde_json::to_string(&vars)?)
}

/// Write `script` to a temporary file and run it with `shell` inside a fresh
/// temporary directory. Both are removed afterwards.
pub async fn execute(script: &[u8], shell: &Path) -> Result<ExitStatus> {
    let workdir = tempfile::tempdir()?;
    let mut file = tempfile::Builder::new()
        .prefix("swarmrunner-")
        .suffix(".sh")
        .tempfile()?;
    file.write_all(script)?;
    file.flush()?;

    let status = tokio::process::Command::new(shell)
        .arg(file.path())
        .current_dir(workdir.path())
        .status()
        .await?;

    Ok(status)
}

/// Register and serve commands forever.
pub async fn run_agent(netloc: &str, name: String, config: ClientConfig) -> anyhow::Result<()> {
    let client = AgentClient::new(netloc, name, &config)
        .context("Failed to build HTTP client")?;

    register_until_accepted(&client, &config).await?;

    loop {
        match client.listen().await {
            Ok(PollOutcome::Payload(script)) => {
                tracing::info!(bytes = script.len(), "Executing command");
                match execute(&script, &config.shell).await {
                    Ok(status) if status.success() => tracing::info!("Command finished: {}", status),
                    Ok(status) => tracing::warn!("Command failed: {}", status),
                    Err(e) => tracing::error!("Could not run command: {}", e),
                }
            }
            Ok(PollOutcome::Timeout) => {
                tracing::trace!("Poll timed out, polling again");
            }
            Err(Error::NotFound(_)) => {
                tracing::warn!("Coordinator no longer knows this agent, re-registering");
                register_until_accepted(&client, &config).await?;
            }
            Err(e) => {
                tracing::warn!("Poll failed: {}; retrying in {:?}", e, config.retry_delay());
                tokio::time::sleep(config.retry_delay()).await;
            }
        }
    }
}

async fn register_until_accepted(client: &AgentClient, config: &ClientConfig) -> anyhow::Result<()> {
    loop {
        match client.register(environment_snapshot()?).await {
            Ok(()) => return Ok(()),
            Err(Error::Conflict(name)) => {
                anyhow::bail!("Name '{}' is already registered with the coordinator", name)
            }
            Err(e) => {
                tracing::warn!("Registration failed: {}; retrying in {:?}", e, config.retry_delay());
                tokio::time::sleep(config.retry_delay()).await;
            }
        }
    }
}
