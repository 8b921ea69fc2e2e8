//! Cancellable, reschedulable deferred tasks.

use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// A single-slot deferred task.
///
/// Each manager owns one scheduler per timer it needs. Scheduling
/// replaces any previously scheduled task, so at most one deferred run
/// is ever outstanding per slot; `cancel` drops the pending run without
/// executing it.
#[derive(Debug)]
pub struct Scheduler {
    name: &'static str,
    slot: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Creates an empty scheduler slot; the name appears in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(None),
        }
    }

    /// Schedules `task` to run after `delay`, replacing any previously
    /// scheduled task.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        debug!(name = self.name, ?delay, "scheduling deferred task");
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }));
    }

    /// Drops the pending task, if any, without executing it.
    pub fn cancel(&self) {
        if let Some(previous) = self.slot.lock().take() {
            debug!(name = self.name, "cancelling deferred task");
            previous.abort();
        }
    }

    /// Returns true if a task is scheduled and has not yet completed.
    pub fn is_scheduled(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.slot.lock().take() {
            handle.abort();
        }
    }
}
