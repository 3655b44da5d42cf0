//! The draining phase.
//!
//! Hooks are started in registration order. Synchronous hooks run inline;
//! asynchronous hooks are started and their completion signals collected.
//! The signals are then awaited together, racing a single force-exit timer,
//! so the total wait is bounded by the slowest hook or the timeout, never
//! their sum.
//!
//! Only [`StepTowardExit::done`] settles a hook. A signal dropped without it
//! keeps the hook pending until the timer fires. The exception is a hook that
//! panics while being started: it is counted as failed and not waited for.

use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures::future::{self, join_all};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::event::ProcessError;
use crate::hook::{ErrorHook, Hook, StepTowardExit};
use crate::timeout::ForceExitTimeout;

/// How draining ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every asynchronous hook settled before the timeout.
    Settled,
    /// The force-exit timeout elapsed first.
    TimedOut {
        /// Asynchronous hooks that had not settled.
        pending: usize,
    },
}

/// Summary of one draining phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Hooks started, error hooks included.
    pub hooks_run: usize,
    /// Asynchronous hooks among them.
    pub async_hooks: usize,
    /// Hooks that panicked while being called.
    pub failed: usize,
    /// Whether draining settled or was forced.
    pub outcome: DrainOutcome,
    /// Time spent draining.
    pub elapsed: Duration,
}

impl DrainReport {
    /// Returns `true` if the force-exit timeout cut draining short.
    #[must_use]
    pub fn is_forced(&self) -> bool {
        matches!(self.outcome, DrainOutcome::TimedOut { .. })
    }
}

/// Snapshot of everything one draining phase runs.
pub(crate) struct DrainPlan<'a> {
    pub(crate) error: Option<&'a ProcessError>,
    pub(crate) error_hooks: Vec<ErrorHook>,
    pub(crate) hooks: Vec<Hook>,
    pub(crate) timeout: ForceExitTimeout,
}

/// Tracks hooks as they are started.
struct Launcher {
    index: usize,
    failed: usize,
    async_hooks: usize,
    waiting: Vec<oneshot::Receiver<()>>,
}

impl Launcher {
    fn new() -> Self {
        Self {
            index: 0,
            failed: 0,
            async_hooks: 0,
            waiting: Vec::new(),
        }
    }

    fn run_sync(&mut self, kind: &'static str, call: impl FnOnce()) {
        self.guard(kind, call);
    }

    fn run_async(&mut self, kind: &'static str, call: impl FnOnce(StepTowardExit)) {
        let (step, rx) = StepTowardExit::new(self.index);
        self.async_hooks += 1;
        if self.guard(kind, move || call(step)) {
            self.waiting.push(rx);
        }
    }

    /// Calls one hook, returning `false` if it panicked.
    fn guard(&mut self, kind: &'static str, call: impl FnOnce()) -> bool {
        let index = self.index;
        self.index += 1;
        tracing::trace!(kind, hook = index, "starting hook");
        if catch_unwind(AssertUnwindSafe(call)).is_err() {
            self.failed += 1;
            tracing::error!(kind, hook = index, "exit hook panicked, continuing with the rest");
            return false;
        }
        true
    }
}

/// Runs every hook in `plan` and waits for the asynchronous ones.
///
/// Must be called within a tokio runtime with the time driver enabled.
pub(crate) async fn drain(plan: DrainPlan<'_>) -> DrainReport {
    let started = Instant::now();
    let mut launcher = Launcher::new();

    if let Some(error) = plan.error {
        for hook in &plan.error_hooks {
            match hook {
                ErrorHook::Sync(hook) => launcher.run_sync("error", || hook(error)),
                ErrorHook::Async(hook) => launcher.run_async("error", |step| hook(error, step)),
            }
        }
    }

    for hook in &plan.hooks {
        match hook {
            Hook::Sync(hook) => launcher.run_sync("exit", || hook()),
            Hook::Async(hook) => launcher.run_async("exit", |step| hook(step)),
        }
    }

    let Launcher {
        index: hooks_run,
        failed,
        async_hooks,
        waiting,
    } = launcher;

    let outcome = if waiting.is_empty() {
        DrainOutcome::Settled
    } else {
        tracing::debug!(
            async_hooks,
            timeout = %plan.timeout,
            "waiting for async exit hooks"
        );
        let waited = waiting.len();
        let settled = Arc::new(AtomicUsize::new(0));
        let signals = waiting.into_iter().map(|rx| {
            let settled = Arc::clone(&settled);
            async move {
                match rx.await {
                    Ok(()) => {
                        settled.fetch_add(1, Ordering::SeqCst);
                    }
                    // Dropped without done(): only the timeout ends this wait.
                    Err(_) => future::pending::<()>().await,
                }
            }
        });

        match tokio::time::timeout(plan.timeout.as_duration(), join_all(signals)).await {
            Ok(_) => DrainOutcome::Settled,
            Err(_) => {
                let pending = waited - settled.load(Ordering::SeqCst);
                tracing::warn!(
                    pending,
                    timeout = %plan.timeout,
                    "force-exit timeout elapsed before all async exit hooks finished"
                );
                DrainOutcome::TimedOut { pending }
            }
        }
    };

    DrainReport {
        hooks_run,
        async_hooks,
        failed,
        outcome,
        elapsed: started.elapsed(),
    }
}
