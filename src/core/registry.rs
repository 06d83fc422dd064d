//! In-memory directory of live agents.
//!
//! One lock guards the name map. Records are handed out as `Arc`s: removal
//! only unlinks a record from the map, so a poll that already looked it up
//! finishes against its own mailbox.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::{AgentSummary, Environment, Mailbox};

use super::liveness::LivenessTimer;

/// A registered agent.
#[derive(Debug)]
pub struct AgentRecord {
    id: u64,
    name: String,
    environment: Environment,
    mailbox: Mailbox,
    timer: LivenessTimer,
}

impl AgentRecord {
    /// Generation number, unique per registration within this process.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            name: self.name.clone(),
            env: self.environment.parse(),
        }
    }
}

/// Registry of agents keyed by name.
#[derive(Debug)]
pub struct Registry {
    clients: Mutex<HashMap<String, Arc<AgentRecord>>>,
    liveness_interval: Duration,
    next_id: AtomicU64,
    this: Weak<Registry>,
}

impl Registry {
    /// Create an empty registry whose agents are evicted after
    /// `liveness_interval` without a poll.
    pub fn new(liveness_interval: Duration) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            clients: Mutex::new(HashMap::new()),
            liveness_interval,
            next_id: AtomicU64::new(1),
            this: this.clone(),
        })
    }

    pub fn liveness_interval(&self) -> Duration {
        self.liveness_interval
    }

    /// Add a new agent and start its liveness timer.
    pub fn register(&self, name: &str, environment: Environment) -> Result<Arc<AgentRecord>> {
        let mut clients = self.lock();
        if clients.contains_key(name) {
            return Err(Error::Conflict(name.to_string()));
        }

        let record = Arc::new(AgentRecord {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            environment,
            mailbox: Mailbox::new(),
            timer: LivenessTimer::new(),
        });
        clients.insert(name.to_string(), record.clone());
        self.arm(&record);
        drop(clients);

        tracing::info!(name, id = record.id, "Registered client");
        Ok(record)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<AgentRecord>> {
        self.lock()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Push the record's eviction deadline out by a full interval.
    pub fn refresh(&self, record: &AgentRecord) {
        self.arm(record);
        tracing::trace!(name = %record.name, "Liveness timer restarted");
    }

    /// Unlink an agent. Removing an unknown name is a no-op.
    ///
    /// Returns whether a record was removed.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.lock().remove(name);
        match removed {
            Some(record) => {
                record.timer.cancel();
                tracing::info!(name, id = record.id, "Removed client");
                true
            }
            None => false,
        }
    }

    /// Snapshot of every registered agent, in no particular order.
    pub fn list(&self) -> Vec<AgentSummary> {
        let records: Vec<_> = self.lock().values().cloned().collect();
        records.iter().map(|r| r.summary()).collect()
    }

    /// Remove every agent and cancel all timers.
    pub fn drain(&self) -> usize {
        let records: Vec<_> = self.lock().drain().map(|(_, r)| r).collect();
        for record in &records {
            record.timer.cancel();
        }
        if !records.is_empty() {
            tracing::info!("Drained {} client(s)", records.len());
        }
        records.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn arm(&self, record: &AgentRecord) {
        let registry = self.this.clone();
        let name = record.name.clone();
        let id = record.id;
        record.timer.start(self.liveness_interval, move || {
            if let Some(registry) = registry.upgrade() {
                registry.evict(&name, id);
            }
        });
    }

    /// Timer callback: remove `name` only if it still maps to generation `id`.
    fn evict(&self, name: &str, id: u64) {
        let evicted = {
            let mut clients = self.lock();
            if clients.get(name).map(|r| r.id) == Some(id) {
                clients.remove(name)
            } else {
                None
            }
        };

        if evicted.is_some() {
            tracing::info!(name, id, "Evicted idle client");
        } else {
            tracing::debug!(name, id, "Stale liveness timer ignored");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<AgentRecord>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    const INTERVAL: Duration = Duration::from_secs(120);

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = Registry::new(INTERVAL);
        let record = registry.register("alice", Environment::from("X=1")).unwrap();

        let found = registry.lookup("alice").unwrap();
        assert!(Arc::ptr_eq(&record, &found));
        assert_eq!(found.name(), "alice");
        assert_eq!(found.environment().as_bytes(), b"X=1");
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_register_conflicts() {
        let registry = Registry::new(INTERVAL);
        let first = registry.register("alice", Environment::from("X=1")).unwrap();
        first.mailbox().deposit(Bytes::from_static(b"ls"));

        let err = registry.register("alice", Environment::from("X=2")).unwrap_err();
        assert!(matches!(err, Error::Conflict(name) if name == "alice"));

        let found = registry.lookup("alice").unwrap();
        assert_eq!(found.id(), first.id());
        assert_eq!(found.environment().as_bytes(), b"X=1");
        assert!(found.mailbox().has_pending());
    }

    #[tokio::test]
    async fn test_lookup_unknown_is_not_found() {
        let registry = Registry::new(INTERVAL);
        assert!(matches!(registry.lookup("nobody"), Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = Registry::new(INTERVAL);
        registry.register("alice", Environment::default()).unwrap();

        assert!(registry.remove("alice"));
        assert!(!registry.remove("alice"));
        assert!(registry.is_empty());
        registry.register("alice", Environment::default()).unwrap();
    }

    #[tokio::test]
    async fn test_list_snapshot() {
        let registry = Registry::new(INTERVAL);
        registry.register("a", Environment::from(r#"{"X":"1"}"#)).unwrap();
        registry.register("b", Environment::from("Y=2")).unwrap();

        let mut listed = registry.list();
        listed.sort_by(|l, r| l.name.cmp(&r.name));

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "a");
        assert_eq!(listed[0].env, serde_json::json!({"X": "1"}));
        assert_eq!(listed[1].name, "b");
        assert_eq!(listed[1].env, serde_json::json!({"Y": "2"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_agent_is_evicted() {
        let registry = Registry::new(INTERVAL);
        registry.register("alice", Environment::default()).unwrap();

        tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
        assert!(matches!(registry.lookup("alice"), Err(Error::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_postpones_eviction() {
        let registry = Registry::new(INTERVAL);
        let record = registry.register("alice", Environment::default()).unwrap();

        tokio::time::sleep(INTERVAL - Duration::from_secs(1)).await;
        registry.refresh(&record);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(registry.lookup("alice").is_ok());

        tokio::time::sleep(INTERVAL).await;
        assert!(registry.lookup("alice").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_spares_new_registration() {
        let registry = Registry::new(INTERVAL);
        let old = registry.register("alice", Environment::default()).unwrap();
        let old_id = old.id();

        // Unlink without cancelling to mimic a timer that already fired.
        registry.lock().remove("alice");
        let new = registry.register("alice", Environment::default()).unwrap();

        registry.evict("alice", old_id);
        assert_eq!(registry.lookup("alice").unwrap().id(), new.id());
    }

    #[tokio::test]
    async fn test_record_usable_after_unlink() {
        let registry = Registry::new(INTERVAL);
        let record = registry.register("alice", Environment::default()).unwrap();
        registry.remove("alice");

        record.mailbox().deposit(Bytes::from_static(b"pwd"));
        let payload = record.mailbox().await_and_consume(Duration::ZERO).await;
        assert_eq!(payload.as_deref(), Some(&b"pwd"[..]));
    }

    #[tokio::test]
    async fn test_drain_empties_registry() {
        let registry = Registry::new(INTERVAL);
        registry.register("a", Environment::default()).unwrap();
        registry.register("b", Environment::default()).unwrap();

        assert_eq!(registry.drain(), 2);
        assert!(registry.is_empty());
        assert_eq!(registry.drain(), 0);
    }
}
