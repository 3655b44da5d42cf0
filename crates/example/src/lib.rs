//! Example service for the exit hook crates.
//!
//! [`JobQueue`] tracks in-flight jobs. [`JobQueue::register`] adds an exit
//! hook that stops accepting work and waits for the jobs already running,
//! so a `SIGTERM` lets them finish (up to the force-exit timeout).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use exit_hook_core::{ErrorHook, ExitHooks};
use tokio::sync::watch;

/// Errors returned when submitting work.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    /// The queue is shutting down.
    #[error("job queue is closed")]
    Closed,
    /// The job itself failed.
    #[error("job {id} failed: {reason}")]
    Failed {
        /// The job id.
        id: u64,
        /// Why it failed.
        reason: String,
    },
}

/// Queue of simulated jobs that drains on exit.
#[derive(Debug, Clone)]
pub struct JobQueue {
    closed: Arc<AtomicBool>,
    in_flight: Arc<watch::Sender<usize>>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    /// Creates an open, empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            closed: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(watch::Sender::new(0)),
        }
    }

    /// Registers the drain hook and an error hook on `hooks`.
    pub fn register(&self, hooks: &ExitHooks) {
        let queue = self.clone();
        hooks.add_future(move || {
            let queue = queue.clone();
            async move { queue.drain().await }
        });
        hooks.uncaught_exception_handler(ErrorHook::sync(|error| {
            tracing::error!(%error, "job queue shutting down after a crash");
        }));
    }

    /// Returns the number of running jobs.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Returns `true` once the queue stopped accepting jobs.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Runs one job that takes `duration`.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Closed`] when the queue is draining.
    pub async fn run(&self, id: u64, duration: Duration) -> Result<(), JobError> {
        if self.is_closed() {
            return Err(JobError::Closed);
        }
        self.in_flight.send_modify(|count| *count += 1);
        tracing::debug!(id, ?duration, "job started");

        tokio::time::sleep(duration).await;

        self.in_flight.send_modify(|count| *count -= 1);
        tracing::debug!(id, "job finished");
        Ok(())
    }

    /// Stops accepting jobs and waits for the running ones.
    pub async fn drain(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut in_flight = self.in_flight.subscribe();
        tracing::info!(in_flight = *in_flight.borrow(), "draining job queue");
        // The sender is owned by `self`, so the channel stays open.
        let _ = in_flight.wait_for(|count| *count == 0).await;
        tracing::info!("job queue drained");
    }
}
