//! Sliding-expiration liveness timer.
//!
//! Each agent record owns one of these. Arming the timer spawns a task that
//! sleeps for the interval and then runs the expiry callback; re-arming
//! aborts the previous task first, so only the most recent arm can fire.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;

#[derive(Debug, Default)]
pub struct LivenessTimer {
    handle: Mutex<Option<AbortHandle>>,
}

impl LivenessTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `on_expire` to run once after `interval`, replacing any
    /// pending expiry.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(&self, interval: Duration, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            on_expire();
        });

        if let Some(previous) = self.slot().replace(task.abort_handle()) {
            previous.abort();
        }
    }

    /// Cancel the pending expiry, if any.
    ///
    /// An expiry already running is not interrupted; the callback has to
    /// cope with the record being gone.
    pub fn cancel(&self) {
        if let Some(handle) = self.slot().take() {
            handle.abort();
        }
    }

    /// Whether an expiry is scheduled and has not completed yet.
    pub fn is_armed(&self) -> bool {
        self.slot().as_ref().is_some_and(|h| !h.is_finished())
    }

    fn slot(&self) -> MutexGuard<'_, Option<AbortHandle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for LivenessTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
