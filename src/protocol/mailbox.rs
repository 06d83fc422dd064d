//! Single-slot mailbox: the hand-off between a sender and a polling agent.
//!
//! The slot holds at most one undelivered payload. A new deposit replaces
//! whatever is waiting there. Consumers block on a [`Notify`] until the slot
//! is filled or their deadline passes; the payload is taken under the slot
//! lock, so any number of concurrent waiters see each deposit at most once.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::body::Bytes;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Stand-in deadline for timeouts too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// An agent's mailbox.
#[derive(Debug, Default)]
pub struct Mailbox {
    /// Payload waiting to be consumed.
    pending: Mutex<Option<Bytes>>,
    /// Wakes waiters after a deposit.
    signal: Notify,
}

impl Mailbox {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload, discarding any unconsumed one, and wake all waiters.
    ///
    /// Returns `true` if an undelivered payload was overwritten.
    pub fn deposit(&self, payload: Bytes) -> bool {
        let replaced = self.slot().replace(payload).is_some();
        self.signal.notify_waiters();
        replaced
    }

    /// Wait up to `timeout` for a payload and take it.
    ///
    /// Returns `None` if the deadline passes first; nothing is consumed in
    /// that case and a later deposit stays in the slot for the next caller.
    pub async fn await_and_consume(&self, timeout: Duration) -> Option<Bytes> {
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now + FAR_FUTURE);

        loop {
            // Register for the wakeup before looking at the slot so a deposit
            // landing between the check and the await is not missed.
            let notified = self.signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self.slot().take() {
                return Some(payload);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
            // Woken: another waiter may have won the race, so loop and re-check.
        }
    }

    /// Whether a payload is waiting, without consuming it.
    pub fn has_pending(&self) -> bool {
        self.slot().is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Bytes>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
