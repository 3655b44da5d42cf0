//! The process-termination primitive.
//!
//! The registry never calls `std::process::exit` directly; it goes through a
//! [`Terminator`] so tests can observe termination without ending the test
//! process.

#[cfg(any(test, feature = "test-utils"))]
use parking_lot::Mutex;
#[cfg(any(test, feature = "test-utils"))]
use tokio::sync::watch;

/// Ends the process with an exit code.
///
/// Implement this to customise how termination happens (for example to
/// record codes in tests).
pub trait Terminator: Send + Sync + 'static {
    /// Terminates with `code`. The process implementation does not return.
    fn terminate(&self, code: i32);
}

/// Terminator calling [`std::process::exit`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, code: i32) {
        tracing::info!(code, "exiting process");
        std::process::exit(code);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RecordingTerminator for Testing
// ─────────────────────────────────────────────────────────────────────────────

/// Terminator that records exit codes instead of exiting.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use exit_hook_core::{ExitHooks, RecordingTerminator};
///
/// let terminator = Arc::new(RecordingTerminator::new());
/// let hooks = ExitHooks::builder()
///     .with_terminator(terminator.clone())
///     .build();
///
/// // ... trigger an event ...
/// let code = terminator.terminated().await;
/// ```
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug)]
pub struct RecordingTerminator {
    codes: Mutex<Vec<i32>>,
    last: watch::Sender<Option<i32>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for RecordingTerminator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl RecordingTerminator {
    /// Creates a terminator that has not been called yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            codes: Mutex::new(Vec::new()),
            last: watch::Sender::new(None),
        }
    }

    /// Returns every recorded exit code, oldest first.
    #[must_use]
    pub fn codes(&self) -> Vec<i32> {
        self.codes.lock().clone()
    }

    /// Returns the most recent exit code.
    #[must_use]
    pub fn last_code(&self) -> Option<i32> {
        *self.last.borrow()
    }

    /// Waits until [`terminate`](Terminator::terminate) has been called and
    /// returns the code.
    pub async fn terminated(&self) -> i32 {
        let mut rx = self.last.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            if let Some(code) = current {
                return code;
            }
            // `self.last` outlives this borrow, so the channel stays open.
            if rx.changed().await.is_err() {
                return self.last_code().unwrap_or_default();
            }
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Terminator for RecordingTerminator {
    fn terminate(&self, code: i32) {
        self.codes.lock().push(code);
        self.last.send_replace(Some(code));
    }
}
