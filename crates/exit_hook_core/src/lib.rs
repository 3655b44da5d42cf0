//! Cleanup hooks that run before a process terminates.
//!
//! `exit_hook_core` keeps a registry of hooks and the process events that
//! trigger them. When a subscribed event occurs, every hook runs once,
//! asynchronous hooks are awaited up to a force-exit timeout, and the process
//! is then terminated with the exit code of the triggering subscription.
//!
//! This crate is runtime-agnostic about *how* events arrive: callers deliver
//! them with [`ExitHooks::emit`]. The `exit_hook_host` crate wires real
//! signals, panics and failed tasks to a registry.
//!
//! # Core Concepts
//!
//! - [`ExitHooks`] - The registry handle
//! - [`Hook`] / [`ErrorHook`] - Cleanup callbacks, synchronous or asynchronous
//! - [`StepTowardExit`] - Completion signal handed to asynchronous hooks
//! - [`ProcessEvent`] / [`EventArgs`] - Triggering events and their payloads
//! - [`ForceExitTimeout`] - Upper bound on waiting for asynchronous hooks
//! - [`Terminator`] - The process-termination primitive
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use exit_hook_core::{EventArgs, ExitHooks, ProcessEvent};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let hooks = ExitHooks::builder().with_default_events(false).build();
//! hooks
//!     .add_sync(|| println!("flushing logs"))
//!     .add_future(|| async {
//!         tokio::time::sleep(Duration::from_millis(5)).await;
//!     })
//!     .hook_event(ProcessEvent::Disconnect, None);
//!
//! let report = hooks.emit(EventArgs::Disconnect).await.into_report().unwrap();
//! assert_eq!(report.drain.hooks_run, 2);
//! assert!(!report.drain.is_forced());
//! # });
//! ```

/// Registry configuration and environment loading.
pub mod config;

/// The draining phase.
pub mod drain;

/// Error types.
pub mod error;

/// Process events, signals and event payloads.
pub mod event;

/// Hook types and the asynchronous completion signal.
pub mod hook;

/// The registry.
pub mod registry;

/// The process-termination primitive.
pub mod terminate;

/// The force-exit timeout.
pub mod timeout;

#[cfg(test)]
mod tests;

pub use config::{DEFAULT_EVENTS_ENV, ExitHookConfig, FORCE_EXIT_TIMEOUT_ENV};
pub use drain::{DrainOutcome, DrainReport};
pub use error::ExitHookError;
pub use event::{ErrorKind, EventArgs, ProcessError, ProcessEvent, ResolveKind, Signal};
pub use hook::{ErrorHook, EventFilter, Hook, StepTowardExit};
pub use registry::{Dispatch, ERROR_EXIT_CODE, ExitHooks, ExitHooksBuilder, ExitReport, Phase};
#[cfg(any(test, feature = "test-utils"))]
pub use terminate::RecordingTerminator;
pub use terminate::{ProcessTerminator, Terminator};
pub use timeout::ForceExitTimeout;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::config::ExitHookConfig;
    pub use crate::drain::{DrainOutcome, DrainReport};
    pub use crate::error::ExitHookError;
    pub use crate::event::{EventArgs, ProcessError, ProcessEvent, Signal};
    pub use crate::hook::{ErrorHook, Hook, StepTowardExit};
    pub use crate::registry::{Dispatch, ExitHooks, ExitReport, Phase};
    pub use crate::terminate::Terminator;
    pub use crate::timeout::ForceExitTimeout;
}
