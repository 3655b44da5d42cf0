//! The installed host.

use core::future::Future;
use core::sync::atomic::{AtomicBool, Ordering};
use std::panic::AssertUnwindSafe;

use exit_hook_core::{Dispatch, EventArgs, ExitHooks, ExitReport, ProcessError, ProcessEvent};
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::HostError;
use crate::panic::{self, payload_message};
use crate::signals;
use crate::trigger::EventSender;

/// Set once a host has been installed in this process.
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Connects an [`ExitHooks`] registry to the running process.
///
/// Installing a host starts:
///
/// - a dispatcher task delivering events sent through [`EventSender`]s to the
///   registry, one at a time;
/// - listeners for every subscribed signal, kept in sync as events are
///   hooked and unhooked.
///
/// Panics become uncaught exceptions where they escape: out of the future
/// given to [`run`](Self::run) or out of a task started with
/// [`spawn`](Self::spawn). Panics the application catches itself are left
/// alone unless [`install_panic_hook`](Self::install_panic_hook) is called.
///
/// Only one host can be installed per process. Dropping the host stops the
/// dispatcher and the listeners; an installed panic hook stays in place but
/// its reports are discarded.
///
/// # Example
///
/// ```no_run
/// use exit_hook_core::ExitHooks;
/// use exit_hook_host::Host;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let hooks = ExitHooks::new();
///     hooks.add_sync(|| tracing::info!("flushing"));
///
///     let host = Host::install(&hooks)?;
///     host.run(async {
///         // application work
///     })
///     .await;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Host {
    hooks: ExitHooks,
    sender: EventSender,
    runtime: Handle,
    dispatcher: JoinHandle<()>,
    signals: JoinHandle<()>,
}

impl Host {
    /// Installs the host for `hooks`.
    ///
    /// # Errors
    ///
    /// - [`HostError::NoRuntime`] when called outside a tokio runtime.
    /// - [`HostError::AlreadyInstalled`] when a host was installed before.
    /// - [`HostError::Signal`] when listening for a subscribed signal fails.
    pub fn install(hooks: &ExitHooks) -> Result<Self, HostError> {
        let runtime = Handle::try_current().map_err(|_| HostError::NoRuntime)?;
        if INSTALLED.swap(true, Ordering::SeqCst) {
            return Err(HostError::AlreadyInstalled);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let sender = EventSender::new(tx);

        let signals = match signals::start(hooks, sender.clone()) {
            Ok(signals) => signals,
            Err(error) => {
                INSTALLED.store(false, Ordering::SeqCst);
                return Err(error);
            }
        };
        let dispatcher = runtime.spawn(dispatch(hooks.clone(), rx));

        tracing::info!(events = ?hooks.hooked_events(), "exit hook host installed");
        Ok(Self {
            hooks: hooks.clone(),
            sender,
            runtime,
            dispatcher,
            signals,
        })
    }

    /// Returns the registry this host drives.
    #[must_use]
    pub fn hooks(&self) -> &ExitHooks {
        &self.hooks
    }

    /// Returns a handle for delivering events from anywhere.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Installs a process-wide panic hook reporting every panic, on any
    /// thread, as an uncaught exception.
    ///
    /// The hook cannot tell whether the panic will be caught later, so a
    /// panic handled by `catch_unwind` or observed through a `JoinHandle`
    /// also starts the exit sequence. Returns `false` if the hook was already
    /// installed.
    pub fn install_panic_hook(&self) -> bool {
        let installed = panic::install(self.sender.clone());
        if installed {
            tracing::debug!("panic hook installed");
        }
        installed
    }

    /// Spawns a supervised task.
    ///
    /// If the task resolves to `Err(e)`, `e` is reported as an unhandled
    /// rejection. If it panics, the panic is reported as an uncaught
    /// exception.
    pub fn spawn<F, T, E>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: core::error::Error + Send + Sync + 'static,
    {
        let sender = self.sender.clone();
        self.runtime.spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(_)) => {}
                Ok(Err(error)) => {
                    sender.unhandled_rejection(ProcessError::from_error(error));
                }
                Err(payload) => {
                    sender.uncaught_exception(ProcessError::panic(payload_message(&*payload)));
                }
            }
        })
    }

    /// Runs the application's main future.
    ///
    /// When `main` completes, `beforeExit` (code 0) and then `exit` (code 0)
    /// are delivered, each awaited. When `main` panics, the uncaught
    /// exception sequence runs instead.
    ///
    /// Returns the report of the exit sequence if one ran here. With the
    /// default [`ProcessTerminator`](exit_hook_core::ProcessTerminator) the
    /// process ends before this returns whenever the triggering event carries
    /// an exit code.
    pub async fn run<F>(&self, main: F) -> Option<ExitReport>
    where
        F: Future<Output = ()>,
    {
        match AssertUnwindSafe(main).catch_unwind().await {
            Ok(()) => {
                tracing::debug!("main future finished");
                let before_exit = self.hooks.emit(EventArgs::BeforeExit { code: 0 }).await;
                let exit = self.hooks.emit(EventArgs::Exit { code: 0 }).await;
                before_exit.into_report().or_else(|| exit.into_report())
            }
            Err(payload) => {
                let error = ProcessError::panic(payload_message(&*payload));
                match self.hooks.report_uncaught_exception(error).await {
                    Dispatch::Exited(report) => Some(report),
                    Dispatch::AlreadyExiting => {
                        self.hooks.wait_for_termination().await;
                        None
                    }
                    Dispatch::Vetoed | Dispatch::Unhooked => None,
                }
            }
        }
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.dispatcher.abort();
        self.signals.abort();
    }
}

/// Delivers queued events to the registry, one at a time.
async fn dispatch(hooks: ExitHooks, mut rx: mpsc::UnboundedReceiver<EventArgs>) {
    while let Some(args) = rx.recv().await {
        let event: ProcessEvent = args.event();
        match hooks.emit(args).await {
            Dispatch::Exited(report) => {
                tracing::debug!(%event, code = ?report.code, "exit sequence finished");
            }
            Dispatch::AlreadyExiting => {
                tracing::debug!(%event, "event arrived during the exit sequence");
            }
            Dispatch::Vetoed | Dispatch::Unhooked => {}
        }
    }
}
