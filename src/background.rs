//! Best-effort work that must not hold up the caller.
//!
//! Failures are logged and counted rather than returned.  [`BackgroundTasks::drain`]
//! waits for everything spawned so far, including tasks spawned while draining.

use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinSet;

use crate::error::Result;
use crate::observability::{BACKGROUND_FAILURES, BACKGROUND_TASKS};

/// A set of fire-and-forget tasks.
#[derive(Default)]
pub struct BackgroundTasks {
    tasks: Mutex<JoinSet<()>>,
}

impl BackgroundTasks {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` on the runtime.  `label` names it in the logs.
    pub fn spawn<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        BACKGROUND_TASKS.click();
        let mut tasks = self.lock();
        // Reap what already finished so the set does not grow unbounded.
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(err) = task.await {
                BACKGROUND_FAILURES.click();
                tracing::warn!(task = label, error = %err, "background task failed");
            } else {
                tracing::debug!(task = label, "background task done");
            }
        });
    }

    /// Number of tasks not yet reaped.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no task is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Wait for every pending task.
    pub async fn drain(&self) {
        loop {
            let mut pending = std::mem::take(&mut *self.lock());
            if pending.is_empty() {
                return;
            }
            while let Some(joined) = pending.join_next().await {
                if let Err(err) = joined {
                    BACKGROUND_FAILURES.click();
                    tracing::warn!(error = %err, "background task panicked");
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
