//! # Scheduled Tasks
//!
//! Cancel/replace-capable handles for the timers the orchestrator re-arms
//! (debounce windows, reconnect backoff, broadcast rotations).

use std::future::Future;
use tokio::task::JoinHandle;

/// A spawned timer task. Replacing or dropping the handle aborts the task.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
