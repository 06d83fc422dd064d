//! Value types shared by the rendezvous protocol and its HTTP surface.

use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Environment snapshot an agent supplies when it registers.
///
/// Stored verbatim; only interpreted when the registry is listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment(Bytes);

impl Environment {
    pub fn new(raw: impl Into<Bytes>) -> Self {
        Self(raw.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Best-effort structured view of the snapshot.
    ///
    /// JSON is taken as-is, `KEY=VALUE` lines become an object of strings,
    /// and anything else is returned as a (lossy) string.
    pub fn parse(&self) -> Value {
        let raw = self.0.as_ref();
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Value::Object(Map::new());
        }

        if let Ok(value) = serde_json::from_slice::<Value>(raw) {
            return value;
        }

        let text = String::from_utf8_lossy(raw);
        parse_assignments(&text).unwrap_or_else(|| Value::String(text.into_owned()))
    }
}

impl From<&str> for Environment {
    fn from(raw: &str) -> Self {
        Self(Bytes::copy_from_slice(raw.as_bytes()))
    }
}

fn parse_assignments(text: &str) -> Option<Value> {
    let mut vars = Map::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (key, value) = line.split_once('=')?;
        if key.is_empty() {
            return None;
        }
        vars.insert(key.to_string(), Value::String(value.to_string()));
    }
    Some(Value::Object(vars))
}

/// Result of a long-poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A command was waiting or arrived during the wait.
    Payload(Bytes),
    /// Nothing arrived in time; the agent should poll again.
    Timeout,
}

/// One entry in a registry listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSummary {
    pub name: String,
    pub env: Value,
}

/// Body of `GET /clients/`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientList {
    pub clients: Vec<AgentSummary>,
}
