//! Native signal listeners following the registry's subscriptions.
//!
//! One listener task runs per subscribed [`Signal`]. The driver watches
//! [`ExitHooks::watch_events`] and starts or aborts listeners as signals are
//! hooked and unhooked.
//!
//! Aborting a listener does not restore the signal's default disposition:
//! once tokio has registered a handler for a signal, that signal no longer
//! kills the process, it is ignored.

use exit_hook_core::{EventArgs, ExitHooks, ProcessEvent, Signal};
use hashbrown::HashMap;
use tokio::task::JoinHandle;

use crate::error::HostError;
use crate::trigger::EventSender;

/// Starts listeners for the currently subscribed signals and spawns a task
/// keeping them in sync with the registry.
///
/// The initial set is registered before this returns, so a signal arriving
/// right after install is not lost to its default disposition.
pub(crate) fn start(hooks: &ExitHooks, sender: EventSender) -> Result<JoinHandle<()>, HostError> {
    let mut events = hooks.watch_events();
    let mut driver = SignalDriver {
        sender,
        listeners: HashMap::new(),
    };

    let initial = events.borrow_and_update().clone();
    driver.sync(&initial)?;

    Ok(tokio::spawn(async move {
        while events.changed().await.is_ok() {
            let current = events.borrow_and_update().clone();
            if let Err(error) = driver.sync(&current) {
                tracing::error!(%error, "failed to update signal listeners");
            }
        }
    }))
}

struct SignalDriver {
    sender: EventSender,
    listeners: HashMap<Signal, JoinHandle<()>>,
}

impl SignalDriver {
    /// Makes the running listeners match the signals in `events`.
    ///
    /// Every signal is attempted; the first registration error is returned.
    fn sync(&mut self, events: &[ProcessEvent]) -> Result<(), HostError> {
        let wanted: Vec<Signal> = events.iter().filter_map(|event| event.signal()).collect();

        self.listeners.retain(|signal, listener| {
            let keep = wanted.contains(signal);
            if !keep {
                tracing::debug!(%signal, "stopping signal listener");
                listener.abort();
            }
            keep
        });

        let mut first_error = None;
        for signal in wanted {
            if self.listeners.contains_key(&signal) {
                continue;
            }
            match listen(signal, self.sender.clone()) {
                Ok(listener) => {
                    tracing::debug!(%signal, "listening for signal");
                    self.listeners.insert(signal, listener);
                }
                Err(HostError::UnsupportedSignal(signal)) => {
                    tracing::debug!(%signal, "signal not supported on this platform, skipping");
                }
                Err(error) if first_error.is_none() => first_error = Some(error),
                Err(error) => tracing::error!(%error, "failed to listen for signal"),
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for SignalDriver {
    fn drop(&mut self) {
        for listener in self.listeners.values() {
            listener.abort();
        }
    }
}

#[cfg(unix)]
fn listen(signal: Signal, sender: EventSender) -> Result<JoinHandle<()>, HostError> {
    use tokio::signal::unix::{SignalKind, signal as unix_signal};

    let kind = match signal {
        Signal::Hup => SignalKind::hangup(),
        Signal::Int => SignalKind::interrupt(),
        Signal::Quit => SignalKind::quit(),
        Signal::Usr1 => SignalKind::user_defined1(),
        Signal::Usr2 => SignalKind::user_defined2(),
        Signal::Pipe => SignalKind::pipe(),
        Signal::Alrm => SignalKind::alarm(),
        Signal::Term => SignalKind::terminate(),
        Signal::Chld => SignalKind::child(),
        Signal::Winch => SignalKind::window_change(),
        Signal::Break => return Err(HostError::UnsupportedSignal(signal)),
    };
    let mut stream = unix_signal(kind).map_err(|source| HostError::Signal { signal, source })?;

    Ok(tokio::spawn(async move {
        while stream.recv().await.is_some() {
            tracing::info!(%signal, "received signal");
            if !sender.emit(EventArgs::from(signal)) {
                break;
            }
        }
    }))
}

#[cfg(windows)]
fn listen(signal: Signal, sender: EventSender) -> Result<JoinHandle<()>, HostError> {
    use tokio::signal::windows;

    match signal {
        Signal::Int => {
            let mut stream =
                windows::ctrl_c().map_err(|source| HostError::Signal { signal, source })?;
            Ok(tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    tracing::info!(%signal, "received console control event");
                    if !sender.emit(EventArgs::from(signal)) {
                        break;
                    }
                }
            }))
        }
        Signal::Break => {
            let mut stream =
                windows::ctrl_break().map_err(|source| HostError::Signal { signal, source })?;
            Ok(tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    tracing::info!(%signal, "received console control event");
                    if !sender.emit(EventArgs::from(signal)) {
                        break;
                    }
                }
            }))
        }
        other => Err(HostError::UnsupportedSignal(other)),
    }
}

#[cfg(not(any(unix, windows)))]
fn listen(signal: Signal, _sender: EventSender) -> Result<JoinHandle<()>, HostError> {
    Err(HostError::UnsupportedSignal(signal))
}
