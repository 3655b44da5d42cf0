//! The exit hook registry.
//!
//! [`ExitHooks`] collects cleanup hooks and error hooks, keeps the set of
//! subscribed [`ProcessEvent`]s, and runs the exit sequence when a
//! subscribed event occurs.
//!
//! # Exit sequence
//!
//! ```text
//! Idle ──(subscribed event, not vetoed)──▶ Draining ──(settled | timeout)──▶ Terminating
//! ```
//!
//! The sequence runs at most once per registry. Error hooks run first (for
//! uncaught exceptions and unhandled rejections), then regular hooks, all
//! in registration order. Afterwards the [`Terminator`] is called with the
//! exit code of the triggering subscription, if it has one.
//!
//! # Example
//!
//! ```
//! use exit_hook_core::{EventArgs, ExitHooks, Signal};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let hooks = ExitHooks::builder().with_default_events(false).build();
//! hooks.add_sync(|| println!("closing files"));
//! hooks.hook_event(Signal::Usr2, None);
//!
//! let dispatch = hooks.emit(EventArgs::from(Signal::Usr2)).await;
//! assert!(dispatch.is_exited());
//! # });
//! ```

use core::fmt;
use core::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::config::ExitHookConfig;
use crate::drain::{DrainPlan, DrainReport, drain};
use crate::error::ExitHookError;
use crate::event::{EventArgs, ProcessError, ProcessEvent, Signal};
use crate::hook::{ErrorHook, EventFilter, Hook, StepTowardExit};
use crate::terminate::{ProcessTerminator, Terminator};
use crate::timeout::ForceExitTimeout;

/// Exit code used for uncaught exceptions and unhandled rejections when the
/// subscription does not name one.
pub const ERROR_EXIT_CODE: i32 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Phase
// ─────────────────────────────────────────────────────────────────────────────

/// Where the registry is in its exit sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Waiting for a triggering event.
    #[default]
    Idle,
    /// Running hooks.
    Draining,
    /// Hooks are done; the process is being terminated. Terminal.
    Terminating,
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

/// Result of the exit sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// The event that triggered the sequence.
    pub event: ProcessEvent,
    /// The exit code handed to the terminator, if any.
    pub code: Option<i32>,
    /// What happened while draining.
    pub drain: DrainReport,
}

/// What happened to one event occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The event is not subscribed.
    Unhooked,
    /// A filter vetoed the occurrence.
    Vetoed,
    /// The exit sequence had already started.
    AlreadyExiting,
    /// The occurrence ran the exit sequence.
    Exited(ExitReport),
}

impl Dispatch {
    /// Returns `true` if this occurrence ran the exit sequence.
    #[must_use]
    pub fn is_exited(&self) -> bool {
        matches!(self, Dispatch::Exited(_))
    }

    /// Returns the exit report, if this occurrence ran the exit sequence.
    #[must_use]
    pub fn into_report(self) -> Option<ExitReport> {
        match self {
            Dispatch::Exited(report) => Some(report),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal state
// ─────────────────────────────────────────────────────────────────────────────

/// Which errors an error hook is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorScope {
    /// Uncaught exceptions and unhandled rejections.
    Uncaught,
    /// Unhandled rejections only.
    Rejection,
}

struct ErrorHookEntry {
    scope: ErrorScope,
    hook: ErrorHook,
}

/// Subscription record for one event.
#[derive(Clone, Default)]
struct Subscription {
    code: Option<i32>,
    filters: Vec<EventFilter>,
}

/// Outcome of matching an occurrence against the subscriptions.
enum Admission {
    Unhooked,
    Vetoed,
    Admitted(Option<i32>),
}

struct Inner {
    hooks: RwLock<Vec<Hook>>,
    error_hooks: RwLock<Vec<ErrorHookEntry>>,
    subscriptions: RwLock<IndexMap<ProcessEvent, Subscription>>,
    timeout: RwLock<ForceExitTimeout>,
    hook_default_events: bool,
    phase: watch::Sender<Phase>,
    events: watch::Sender<Vec<ProcessEvent>>,
    terminator: Arc<dyn Terminator>,
}

// ─────────────────────────────────────────────────────────────────────────────
// ExitHooksBuilder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`ExitHooks`].
#[derive(Default)]
pub struct ExitHooksBuilder {
    config: ExitHookConfig,
    terminator: Option<Arc<dyn Terminator>>,
}

impl ExitHooksBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExitHookConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the force-exit timeout.
    #[must_use]
    pub fn with_force_exit_timeout(mut self, timeout: ForceExitTimeout) -> Self {
        self.config.force_exit_timeout = timeout;
        self
    }

    /// Enables or disables the default event subscriptions.
    #[must_use]
    pub fn with_default_events(mut self, enabled: bool) -> Self {
        self.config.hook_default_events = enabled;
        self
    }

    /// Sets the termination primitive. Defaults to [`ProcessTerminator`].
    #[must_use]
    pub fn with_terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    /// Builds the registry.
    #[must_use]
    pub fn build(self) -> ExitHooks {
        let terminator = self
            .terminator
            .unwrap_or_else(|| Arc::new(ProcessTerminator));
        ExitHooks {
            inner: Arc::new(Inner {
                hooks: RwLock::new(Vec::new()),
                error_hooks: RwLock::new(Vec::new()),
                subscriptions: RwLock::new(IndexMap::new()),
                timeout: RwLock::new(self.config.force_exit_timeout),
                hook_default_events: self.config.hook_default_events,
                phase: watch::Sender::new(Phase::Idle),
                events: watch::Sender::new(Vec::new()),
                terminator,
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ExitHooks
// ─────────────────────────────────────────────────────────────────────────────

/// Registry of exit hooks.
///
/// A cheap, clonable handle; clones share the same registry. Create one at
/// process start and pass it to the code that registers hooks.
///
/// # Thread Safety
///
/// Collections sit behind [`RwLock`]s. Draining works on a snapshot and
/// never holds a lock while calling user code, so hooks may themselves use
/// the registry.
#[derive(Clone)]
pub struct ExitHooks {
    inner: Arc<Inner>,
}

impl Default for ExitHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ExitHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExitHooks")
            .field("hooks", &self.inner.hooks.read().len())
            .field("error_hooks", &self.inner.error_hooks.read().len())
            .field("events", &self.hooked_events())
            .field("force_exit_timeout", &self.force_exit_timeout())
            .field("phase", &self.phase())
            .finish()
    }
}

impl ExitHooks {
    /// Creates a registry with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        ExitHooksBuilder::new().build()
    }

    /// Creates a registry with the given configuration.
    #[must_use]
    pub fn with_config(config: ExitHookConfig) -> Self {
        ExitHooksBuilder::new().with_config(config).build()
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder() -> ExitHooksBuilder {
        ExitHooksBuilder::new()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hook registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a hook. Hooks run in registration order.
    ///
    /// When this is the first hook and default events are enabled, the
    /// default event set is subscribed: `exit` (no code), `beforeExit` (0),
    /// `SIGHUP`, `SIGINT`, `SIGTERM` and `SIGBREAK` (`128 + signal`), and
    /// `message` (0, only for the message `"shutdown"`). Events that are
    /// already subscribed keep their subscription.
    pub fn add(&self, hook: Hook) -> &Self {
        let first = {
            let mut hooks = self.inner.hooks.write();
            hooks.push(hook);
            hooks.len() == 1
        };
        tracing::debug!("registered exit hook");

        if first && self.inner.hook_default_events {
            self.hook_default_events();
        }
        self
    }

    /// Registers a synchronous hook.
    pub fn add_sync(&self, hook: impl Fn() + Send + Sync + 'static) -> &Self {
        self.add(Hook::sync(hook))
    }

    /// Registers an asynchronous hook that settles the given signal itself.
    pub fn add_callback(&self, hook: impl Fn(StepTowardExit) + Send + Sync + 'static) -> &Self {
        self.add(Hook::callback(hook))
    }

    /// Registers an asynchronous hook from a future factory.
    pub fn add_future<F, Fut>(&self, hook: F) -> &Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.add(Hook::future(hook))
    }

    /// Registers an error hook for uncaught exceptions.
    ///
    /// It also runs for unhandled rejections.
    pub fn uncaught_exception_handler(&self, hook: ErrorHook) -> &Self {
        self.add_error_hook(ErrorScope::Uncaught, hook)
    }

    /// Registers an error hook for unhandled rejections.
    pub fn unhandled_rejection_handler(&self, hook: ErrorHook) -> &Self {
        self.add_error_hook(ErrorScope::Rejection, hook)
    }

    fn add_error_hook(&self, scope: ErrorScope, hook: ErrorHook) -> &Self {
        self.inner
            .error_hooks
            .write()
            .push(ErrorHookEntry { scope, hook });
        tracing::debug!(?scope, "registered error hook");
        self
    }

    /// Returns the number of registered hooks, error hooks excluded.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.inner.hooks.read().len()
    }

    /// Returns the number of registered error hooks.
    #[must_use]
    pub fn error_hook_count(&self) -> usize {
        self.inner.error_hooks.read().len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event subscriptions
    // ─────────────────────────────────────────────────────────────────────────

    /// Subscribes to `event`.
    ///
    /// When the event occurs, the exit sequence runs and the process is then
    /// terminated with `code`. With `code = None`, termination is left to the
    /// process. Subscribing an event again replaces its exit code and keeps
    /// its filters.
    pub fn hook_event(&self, event: impl Into<ProcessEvent>, code: Option<i32>) -> &Self {
        self.subscribe(event.into(), code, None);
        self
    }

    /// Subscribes to `event` with a filter.
    ///
    /// The filter receives each occurrence; returning `true` vetoes the exit
    /// sequence for that occurrence. Filters accumulate across calls for the
    /// same event and any one of them can veto.
    pub fn hook_event_with_filter<F>(
        &self,
        event: impl Into<ProcessEvent>,
        code: Option<i32>,
        filter: F,
    ) -> &Self
    where
        F: Fn(&EventArgs) -> bool + Send + Sync + 'static,
    {
        self.subscribe(event.into(), code, Some(Arc::new(filter)));
        self
    }

    fn subscribe(&self, event: ProcessEvent, code: Option<i32>, filter: Option<EventFilter>) {
        let added = {
            let mut subscriptions = self.inner.subscriptions.write();
            let added = !subscriptions.contains_key(&event);
            let subscription = subscriptions.entry(event).or_default();
            subscription.code = code;
            subscription.filters.extend(filter);
            added
        };
        tracing::debug!(%event, ?code, "hooked process event");

        if added {
            self.publish_events();
        }
    }

    fn hook_default_events(&self) {
        let defaults = [
            (ProcessEvent::Exit, None),
            (ProcessEvent::BeforeExit, Some(0)),
            (Signal::Hup.into(), Some(Signal::Hup.exit_code())),
            (Signal::Int.into(), Some(Signal::Int.exit_code())),
            (Signal::Term.into(), Some(Signal::Term.exit_code())),
            (Signal::Break.into(), Some(Signal::Break.exit_code())),
        ];
        for (event, code) in defaults {
            if !self.is_hooked(event) {
                self.hook_event(event, code);
            }
        }
        if !self.is_hooked(ProcessEvent::Message) {
            self.hook_event_with_filter(ProcessEvent::Message, Some(0), |args| {
                !is_shutdown_message(args)
            });
        }
    }

    /// Removes the subscription for `event`. No effect if it is not subscribed.
    pub fn unhook_event(&self, event: impl Into<ProcessEvent>) -> &Self {
        let event = event.into();
        let removed = self
            .inner
            .subscriptions
            .write()
            .shift_remove(&event)
            .is_some();

        if removed {
            tracing::debug!(%event, "unhooked process event");
            self.publish_events();
        }
        self
    }

    /// Returns the subscribed events, in the order they were first hooked.
    #[must_use]
    pub fn hooked_events(&self) -> Vec<ProcessEvent> {
        self.inner.subscriptions.read().keys().copied().collect()
    }

    /// Returns `true` if `event` is subscribed.
    #[must_use]
    pub fn is_hooked(&self, event: impl Into<ProcessEvent>) -> bool {
        self.inner.subscriptions.read().contains_key(&event.into())
    }

    /// Returns the exit code configured for `event`, if it is subscribed
    /// with one.
    #[must_use]
    pub fn exit_code_for(&self, event: impl Into<ProcessEvent>) -> Option<i32> {
        self.inner
            .subscriptions
            .read()
            .get(&event.into())
            .and_then(|subscription| subscription.code)
    }

    /// Returns a receiver tracking the subscribed event set.
    ///
    /// Host integrations use this to start and stop native listeners as
    /// events are hooked and unhooked.
    #[must_use]
    pub fn watch_events(&self) -> watch::Receiver<Vec<ProcessEvent>> {
        self.inner.events.subscribe()
    }

    fn publish_events(&self) {
        self.inner.events.send_replace(self.hooked_events());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Force-exit timeout
    // ─────────────────────────────────────────────────────────────────────────

    /// Sets how long draining waits for asynchronous hooks, in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`ExitHookError::TimeoutOutOfRange`] if `millis` is larger
    /// than `2^31 - 1`; the current timeout is kept.
    pub fn set_force_exit_timeout(&self, millis: u64) -> Result<(), ExitHookError> {
        let timeout = ForceExitTimeout::from_millis(millis)?;
        *self.inner.timeout.write() = timeout;
        tracing::debug!(%timeout, "force-exit timeout updated");
        Ok(())
    }

    /// Returns the current force-exit timeout.
    #[must_use]
    pub fn force_exit_timeout(&self) -> ForceExitTimeout {
        *self.inner.timeout.read()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Triggering
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.inner.phase.borrow()
    }

    /// Waits until the exit sequence has finished draining.
    pub async fn wait_for_termination(&self) {
        let mut phase = self.inner.phase.subscribe();
        // The sender lives in `self.inner`, so the channel cannot close here.
        let _ = phase.wait_for(|phase| *phase == Phase::Terminating).await;
    }

    /// Delivers an occurrence of a process event.
    ///
    /// `UncaughtException` and `UnhandledRejection` occurrences are routed to
    /// [`report_uncaught_exception`](Self::report_uncaught_exception) and
    /// [`report_unhandled_rejection`](Self::report_unhandled_rejection).
    pub async fn emit(&self, args: EventArgs) -> Dispatch {
        match args {
            EventArgs::UncaughtException { error } => self.report_uncaught_exception(error).await,
            EventArgs::UnhandledRejection { error } => {
                self.report_unhandled_rejection(error).await
            }
            args => {
                let event = args.event();
                match self.admit(&args) {
                    Admission::Unhooked => {
                        tracing::trace!(%event, "ignoring unhooked event");
                        Dispatch::Unhooked
                    }
                    Admission::Vetoed => {
                        tracing::debug!(%event, "event vetoed by filter");
                        Dispatch::Vetoed
                    }
                    Admission::Admitted(code) => self.exit(event, code, None).await,
                }
            }
        }
    }

    /// Delivers an uncaught exception.
    ///
    /// Runs uncaught-exception error hooks with `error`, then the regular
    /// hooks, then terminates with the `uncaughtException` subscription's
    /// code, or [`ERROR_EXIT_CODE`].
    pub async fn report_uncaught_exception(&self, error: ProcessError) -> Dispatch {
        self.report(ErrorScope::Uncaught, error).await
    }

    /// Delivers an unhandled rejection.
    ///
    /// Runs every error hook (both scopes) with `error`, then the regular
    /// hooks, then terminates with the `unhandledRejection` subscription's
    /// code, or [`ERROR_EXIT_CODE`].
    pub async fn report_unhandled_rejection(&self, error: ProcessError) -> Dispatch {
        self.report(ErrorScope::Rejection, error).await
    }

    async fn report(&self, scope: ErrorScope, error: ProcessError) -> Dispatch {
        let args = match scope {
            ErrorScope::Uncaught => EventArgs::UncaughtException {
                error: error.clone(),
            },
            ErrorScope::Rejection => EventArgs::UnhandledRejection {
                error: error.clone(),
            },
        };
        let event = args.event();

        let code = match self.admit(&args) {
            Admission::Vetoed => {
                tracing::debug!(%event, %error, "error vetoed by filter");
                return Dispatch::Vetoed;
            }
            Admission::Unhooked => ERROR_EXIT_CODE,
            Admission::Admitted(code) => code.unwrap_or(ERROR_EXIT_CODE),
        };

        tracing::error!(%event, %error, "unhandled process error");
        self.exit(event, Some(code), Some((scope, &error))).await
    }

    /// Matches an occurrence against its subscription and runs its filters.
    fn admit(&self, args: &EventArgs) -> Admission {
        let Some(subscription) = self.inner.subscriptions.read().get(&args.event()).cloned()
        else {
            return Admission::Unhooked;
        };

        for filter in &subscription.filters {
            let vetoed = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| filter(args)))
                .unwrap_or_else(|_| {
                    tracing::error!(event = %args.event(), "event filter panicked, ignoring it");
                    false
                });
            if vetoed {
                return Admission::Vetoed;
            }
        }
        Admission::Admitted(subscription.code)
    }

    /// Runs the exit sequence once.
    async fn exit(
        &self,
        event: ProcessEvent,
        code: Option<i32>,
        error: Option<(ErrorScope, &ProcessError)>,
    ) -> Dispatch {
        let began = self.inner.phase.send_if_modified(|phase| {
            if *phase == Phase::Idle {
                *phase = Phase::Draining;
                true
            } else {
                false
            }
        });
        if !began {
            tracing::debug!(%event, "exit sequence already running");
            return Dispatch::AlreadyExiting;
        }

        tracing::info!(%event, ?code, "running exit hooks");
        let plan = self.plan(error);
        let report = drain(plan).await;

        self.inner.phase.send_replace(Phase::Terminating);
        tracing::info!(
            %event,
            hooks = report.hooks_run,
            failed = report.failed,
            forced = report.is_forced(),
            elapsed = ?report.elapsed,
            "exit hooks finished"
        );

        match code {
            Some(code) => self.inner.terminator.terminate(code),
            None => tracing::debug!(%event, "no exit code, leaving termination to the process"),
        }

        Dispatch::Exited(ExitReport {
            event,
            code,
            drain: report,
        })
    }

    /// Snapshots the hooks one exit sequence runs.
    fn plan<'a>(&self, error: Option<(ErrorScope, &'a ProcessError)>) -> DrainPlan<'a> {
        let error_hooks = match error {
            Some((scope, _)) => self
                .inner
                .error_hooks
                .read()
                .iter()
                .filter(|entry| scope == ErrorScope::Rejection || entry.scope == scope)
                .map(|entry| entry.hook.clone())
                .collect(),
            None => Vec::new(),
        };

        DrainPlan {
            error: error.map(|(_, error)| error),
            error_hooks,
            hooks: self.inner.hooks.read().clone(),
            timeout: self.force_exit_timeout(),
        }
    }
}

/// Returns `true` for the IPC message that asks the process to shut down.
fn is_shutdown_message(args: &EventArgs) -> bool {
    matches!(args, EventArgs::Message { message } if message.as_str() == Some("shutdown"))
}
