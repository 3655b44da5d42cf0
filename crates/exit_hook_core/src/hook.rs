//! Hook types and the completion signal handed to asynchronous hooks.
//!
//! A [`Hook`] is either synchronous, running to completion when called, or
//! asynchronous, receiving a [`StepTowardExit`] it settles once its work is
//! done. [`ErrorHook`] follows the same contract and additionally receives
//! the [`ProcessError`] that started the exit sequence.

use core::fmt;
use core::future::Future;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::event::{EventArgs, ProcessError};

/// Predicate over an event occurrence. Returning `true` vetoes the exit
/// sequence for that occurrence.
pub type EventFilter = Arc<dyn Fn(&EventArgs) -> bool + Send + Sync>;

type SyncFn = dyn Fn() + Send + Sync;
type AsyncFn = dyn Fn(StepTowardExit) + Send + Sync;
type SyncErrorFn = dyn Fn(&ProcessError) + Send + Sync;
type AsyncErrorFn = dyn Fn(&ProcessError, StepTowardExit) + Send + Sync;

// ─────────────────────────────────────────────────────────────────────────────
// StepTowardExit
// ─────────────────────────────────────────────────────────────────────────────

/// Completion signal for an asynchronous hook.
///
/// Call [`done`](Self::done) when the hook has finished. A signal dropped
/// without `done` leaves its hook pending: draining then waits for the
/// force-exit timeout. The drop is logged so the forgotten call can be found.
pub struct StepTowardExit {
    tx: Option<oneshot::Sender<()>>,
    index: usize,
}

impl StepTowardExit {
    /// Creates the signal for the hook at `index`.
    pub(crate) fn new(index: usize) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx), index }, rx)
    }

    /// Marks the hook as finished.
    pub fn done(mut self) {
        if let Some(tx) = self.tx.take() {
            // The receiver is gone once draining was forced.
            let _ = tx.send(());
        }
    }
}

impl Drop for StepTowardExit {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!(
                hook = self.index,
                "async exit hook dropped its completion signal without calling done(), \
                 it stays pending until the force-exit timeout"
            );
        }
    }
}

impl fmt::Debug for StepTowardExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepTowardExit")
            .field("hook", &self.index)
            .field("settled", &self.tx.is_none())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook
// ─────────────────────────────────────────────────────────────────────────────

/// A cleanup callback run while draining.
///
/// # Example
///
/// ```
/// use exit_hook_core::Hook;
///
/// let flush = Hook::sync(|| println!("flushing"));
/// let close = Hook::callback(|step| {
///     // start some work, settle the signal when it finishes
///     step.done();
/// });
/// assert!(!flush.is_async());
/// assert!(close.is_async());
/// ```
#[derive(Clone)]
pub enum Hook {
    /// Runs to completion when called.
    Sync(Arc<SyncFn>),
    /// Settles the passed [`StepTowardExit`] when finished.
    Async(Arc<AsyncFn>),
}

impl Hook {
    /// Creates a synchronous hook.
    pub fn sync(hook: impl Fn() + Send + Sync + 'static) -> Self {
        Hook::Sync(Arc::new(hook))
    }

    /// Creates an asynchronous hook that settles the given signal itself.
    pub fn callback(hook: impl Fn(StepTowardExit) + Send + Sync + 'static) -> Self {
        Hook::Async(Arc::new(hook))
    }

    /// Creates an asynchronous hook from a future factory.
    ///
    /// The future is spawned on the current tokio runtime when draining
    /// starts, and the hook settles when it resolves. A future that panics
    /// never resolves, so its hook stays pending.
    pub fn future<F, Fut>(hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Hook::callback(move |step| {
            let work = hook();
            tokio::spawn(async move {
                work.await;
                step.done();
            });
        })
    }

    /// Returns `true` for asynchronous hooks.
    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self, Hook::Async(_))
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Sync(_) => f.write_str("Hook::Sync"),
            Hook::Async(_) => f.write_str("Hook::Async"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ErrorHook
// ─────────────────────────────────────────────────────────────────────────────

/// A callback run with the error that started the exit sequence.
#[derive(Clone)]
pub enum ErrorHook {
    /// Runs to completion when called.
    Sync(Arc<SyncErrorFn>),
    /// Settles the passed [`StepTowardExit`] when finished.
    Async(Arc<AsyncErrorFn>),
}

impl ErrorHook {
    /// Creates a synchronous error hook.
    pub fn sync(hook: impl Fn(&ProcessError) + Send + Sync + 'static) -> Self {
        ErrorHook::Sync(Arc::new(hook))
    }

    /// Creates an asynchronous error hook that settles the given signal itself.
    pub fn callback(hook: impl Fn(&ProcessError, StepTowardExit) + Send + Sync + 'static) -> Self {
        ErrorHook::Async(Arc::new(hook))
    }

    /// Creates an asynchronous error hook from a future factory.
    ///
    /// See [`Hook::future`].
    pub fn future<F, Fut>(hook: F) -> Self
    where
        F: Fn(ProcessError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        ErrorHook::callback(move |error, step| {
            let work = hook(error.clone());
            tokio::spawn(async move {
                work.await;
                step.done();
            });
        })
    }

    /// Returns `true` for asynchronous error hooks.
    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self, ErrorHook::Async(_))
    }
}

impl fmt::Debug for ErrorHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorHook::Sync(_) => f.write_str("ErrorHook::Sync"),
            ErrorHook::Async(_) => f.write_str("ErrorHook::Async"),
        }
    }
}
