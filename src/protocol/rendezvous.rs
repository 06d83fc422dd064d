//! Request-level rendezvous protocol: register, poll, send, list.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;

use crate::core::Registry;
use crate::error::{Error, Result};

use super::types::{AgentSummary, Environment, PollOutcome};

/// Coordinates registry, mailboxes and liveness timers on behalf of the
/// transport layer.
#[derive(Debug, Clone)]
pub struct Rendezvous {
    registry: Arc<Registry>,
    poll_timeout: Duration,
}

impl Rendezvous {
    pub fn new(registry: Arc<Registry>, poll_timeout: Duration) -> Self {
        Self {
            registry,
            poll_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    pub fn register(&self, name: &str, environment: Environment) -> Result<()> {
        validate_name(name)?;
        self.registry.register(name, environment)?;
        Ok(())
    }

    /// Long-poll for the next command addressed to `name`.
    ///
    /// The registry lock is released before waiting; the wait runs against
    /// the record looked up here even if it is evicted meanwhile.
    pub async fn poll(&self, name: &str) -> Result<PollOutcome> {
        validate_name(name)?;
        let record = self.registry.lookup(name)?;
        self.registry.refresh(&record);

        tracing::debug!(name, timeout = ?self.poll_timeout, "Waiting for command");
        match record.mailbox().await_and_consume(self.poll_timeout).await {
            Some(payload) => {
                tracing::info!(name, bytes = payload.len(), "Delivered command");
                Ok(PollOutcome::Payload(payload))
            }
            None => {
                tracing::debug!(name, "No command before timeout");
                Ok(PollOutcome::Timeout)
            }
        }
    }

    /// Leave a command for `name`, replacing any undelivered one.
    pub fn send(&self, name: &str, payload: Bytes) -> Result<()> {
        validate_name(name)?;
        let record = self.registry.lookup(name)?;
        let bytes = payload.len();
        if record.mailbox().deposit(payload) {
            tracing::warn!(name, "Overwrote undelivered command");
        }
        tracing::info!(name, bytes, "Queued command");
        Ok(())
    }

    pub fn list(&self) -> Vec<AgentSummary> {
        self.registry.list()
    }

    /// Administrative removal; unknown names are ignored.
    pub fn remove(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        if !self.registry.remove(name) {
            tracing::debug!(name, "Remove requested for unknown client");
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Malformed("empty client name".to_string()));
    }
    if name.contains('/') || name.chars().any(char::is_control) {
        return Err(Error::Malformed(format!("invalid client name: {:?}", name)));
    }
    Ok(())
}
