//! Handle for delivering events to an installed host.

use exit_hook_core::{EventArgs, ProcessError};
use tokio::sync::mpsc;

/// Sends event occurrences to the host's dispatcher.
///
/// Cheap to clone and usable from any thread, including synchronous code
/// and panic hooks. Occurrences are handled in the order they are sent.
///
/// # Example
///
/// ```ignore
/// let sender = host.sender();
/// std::thread::spawn(move || {
///     sender.emit(EventArgs::message("shutdown"));
/// });
/// ```
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<EventArgs>,
}

impl EventSender {
    pub(crate) fn new(tx: mpsc::UnboundedSender<EventArgs>) -> Self {
        Self { tx }
    }

    /// Delivers an occurrence. Returns `false` if the host is gone.
    pub fn emit(&self, args: EventArgs) -> bool {
        let event = args.event();
        match self.tx.send(args) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(%event, "host dispatcher is gone, dropping event");
                false
            }
        }
    }

    /// Reports an uncaught exception.
    pub fn uncaught_exception(&self, error: ProcessError) -> bool {
        self.emit(EventArgs::UncaughtException { error })
    }

    /// Reports an unhandled rejection.
    pub fn unhandled_rejection(&self, error: ProcessError) -> bool {
        self.emit(EventArgs::UnhandledRejection { error })
    }

    /// Returns `true` once the host's dispatcher has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exit_hook_core::{ProcessEvent, Signal};

    #[test]
    fn forwards_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = EventSender::new(tx);

        assert!(sender.emit(EventArgs::from(Signal::Int)));
        assert!(sender.unhandled_rejection(ProcessError::rejection("lost")));

        assert_eq!(
            rx.try_recv().unwrap().event(),
            ProcessEvent::Signal(Signal::Int)
        );
        assert_eq!(
            rx.try_recv().unwrap().event(),
            ProcessEvent::UnhandledRejection
        );
    }

    #[test]
    fn reports_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = EventSender::new(tx);
        drop(rx);

        assert!(sender.is_closed());
        assert!(!sender.uncaught_exception(ProcessError::panic("late")));
    }
}
