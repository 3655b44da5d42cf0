//! Process lifecycle events and their typed arguments.
//!
//! [`ProcessEvent`] names something that can trigger the exit sequence: a
//! lifecycle event or a catchable [`Signal`]. [`EventArgs`] carries one
//! occurrence of an event together with its payload, and is what
//! subscription filters receive.
//!
//! # Example
//!
//! ```
//! use exit_hook_core::{EventArgs, ProcessEvent, Signal};
//!
//! let event: ProcessEvent = "SIGTERM".parse().unwrap();
//! assert_eq!(event, ProcessEvent::Signal(Signal::Term));
//!
//! let args = EventArgs::message("shutdown");
//! assert_eq!(args.event(), ProcessEvent::Message);
//! assert_eq!(args.event().to_string(), "message");
//! ```

use core::fmt;
use core::str::FromStr;
use std::sync::Arc;

use crate::error::ExitHookError;

// ─────────────────────────────────────────────────────────────────────────────
// Signal
// ─────────────────────────────────────────────────────────────────────────────

/// Catchable process signals.
///
/// `SIGKILL` and `SIGSTOP` are deliberately absent: a process cannot run any
/// code when it receives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {
    /// `SIGHUP`: controlling terminal closed.
    Hup,
    /// `SIGINT`: interrupt from the keyboard (Ctrl+C).
    Int,
    /// `SIGQUIT`: quit from the keyboard.
    Quit,
    /// `SIGUSR1`: user-defined signal 1.
    Usr1,
    /// `SIGUSR2`: user-defined signal 2.
    Usr2,
    /// `SIGPIPE`: write to a pipe with no readers.
    Pipe,
    /// `SIGALRM`: timer expired.
    Alrm,
    /// `SIGTERM`: termination request.
    Term,
    /// `SIGCHLD`: child process stopped or terminated.
    Chld,
    /// `SIGWINCH`: terminal window resized.
    Winch,
    /// `SIGBREAK`: Ctrl+Break on Windows consoles.
    Break,
}

/// Signal numbers that differ between Linux and the BSD family.
#[cfg(any(
    target_vendor = "apple",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
mod numbers {
    pub(super) const USR1: i32 = 30;
    pub(super) const USR2: i32 = 31;
    pub(super) const CHLD: i32 = 20;
}

#[cfg(not(any(
    target_vendor = "apple",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
)))]
mod numbers {
    pub(super) const USR1: i32 = 10;
    pub(super) const USR2: i32 = 12;
    pub(super) const CHLD: i32 = 17;
}

impl Signal {
    /// Every supported signal.
    pub const ALL: [Signal; 11] = [
        Signal::Hup,
        Signal::Int,
        Signal::Quit,
        Signal::Usr1,
        Signal::Usr2,
        Signal::Pipe,
        Signal::Alrm,
        Signal::Term,
        Signal::Chld,
        Signal::Winch,
        Signal::Break,
    ];

    /// Returns the conventional signal name, e.g. `"SIGINT"`.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Signal::Hup => "SIGHUP",
            Signal::Int => "SIGINT",
            Signal::Quit => "SIGQUIT",
            Signal::Usr1 => "SIGUSR1",
            Signal::Usr2 => "SIGUSR2",
            Signal::Pipe => "SIGPIPE",
            Signal::Alrm => "SIGALRM",
            Signal::Term => "SIGTERM",
            Signal::Chld => "SIGCHLD",
            Signal::Winch => "SIGWINCH",
            Signal::Break => "SIGBREAK",
        }
    }

    /// Returns the signal number on the target platform.
    ///
    /// `SIGUSR1`, `SIGUSR2` and `SIGCHLD` differ between Linux and the BSD
    /// family (macOS included); the others are the same everywhere.
    /// `SIGBREAK` uses the Windows value.
    #[must_use]
    pub const fn number(self) -> i32 {
        match self {
            Signal::Hup => 1,
            Signal::Int => 2,
            Signal::Quit => 3,
            Signal::Usr1 => numbers::USR1,
            Signal::Usr2 => numbers::USR2,
            Signal::Pipe => 13,
            Signal::Alrm => 14,
            Signal::Term => 15,
            Signal::Chld => numbers::CHLD,
            Signal::Break => 21,
            Signal::Winch => 28,
        }
    }

    /// Exit status a shell reports for a process killed by this signal
    /// (`128 + number`), so it follows [`number`](Self::number) across
    /// platforms.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        128 + self.number()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Signal {
    type Err = ExitHookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(signal) = Signal::ALL.into_iter().find(|signal| signal.name() == s) {
            return Ok(signal);
        }
        match s {
            "SIGKILL" | "SIGSTOP" => Err(ExitHookError::UncatchableSignal(s.to_owned())),
            _ => Err(ExitHookError::UnknownEvent(s.to_owned())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ProcessEvent
// ─────────────────────────────────────────────────────────────────────────────

/// Something that can trigger the exit sequence.
///
/// Subscriptions are keyed by `ProcessEvent`. The string form matches the
/// conventional event names (`"beforeExit"`, `"SIGINT"`, ...), see
/// [`name`](Self::name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessEvent {
    /// The application's main work finished and the process is about to exit.
    BeforeExit,
    /// The parent process closed the IPC channel.
    Disconnect,
    /// The process is exiting.
    Exit,
    /// A rejection was handled after having been reported as unhandled.
    RejectionHandled,
    /// A synchronous error (panic) was not caught.
    UncaughtException,
    /// An asynchronous task failed and nobody observed the failure.
    UnhandledRejection,
    /// A process warning was emitted.
    Warning,
    /// A message arrived over the IPC channel.
    Message,
    /// A listener was added.
    NewListener,
    /// A listener was removed.
    RemoveListener,
    /// A completion handle was settled more than once.
    MultipleResolves,
    /// A signal was delivered.
    Signal(Signal),
}

impl ProcessEvent {
    /// Lifecycle events, in declaration order. Signals are listed in
    /// [`Signal::ALL`].
    pub const LIFECYCLE: [ProcessEvent; 11] = [
        ProcessEvent::BeforeExit,
        ProcessEvent::Disconnect,
        ProcessEvent::Exit,
        ProcessEvent::RejectionHandled,
        ProcessEvent::UncaughtException,
        ProcessEvent::UnhandledRejection,
        ProcessEvent::Warning,
        ProcessEvent::Message,
        ProcessEvent::NewListener,
        ProcessEvent::RemoveListener,
        ProcessEvent::MultipleResolves,
    ];

    /// Returns the conventional event name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ProcessEvent::BeforeExit => "beforeExit",
            ProcessEvent::Disconnect => "disconnect",
            ProcessEvent::Exit => "exit",
            ProcessEvent::RejectionHandled => "rejectionHandled",
            ProcessEvent::UncaughtException => "uncaughtException",
            ProcessEvent::UnhandledRejection => "unhandledRejection",
            ProcessEvent::Warning => "warning",
            ProcessEvent::Message => "message",
            ProcessEvent::NewListener => "newListener",
            ProcessEvent::RemoveListener => "removeListener",
            ProcessEvent::MultipleResolves => "multipleResolves",
            ProcessEvent::Signal(signal) => signal.name(),
        }
    }

    /// Returns the signal if this event is one.
    #[must_use]
    pub const fn signal(self) -> Option<Signal> {
        match self {
            ProcessEvent::Signal(signal) => Some(signal),
            _ => None,
        }
    }
}

impl From<Signal> for ProcessEvent {
    fn from(signal: Signal) -> Self {
        ProcessEvent::Signal(signal)
    }
}

impl fmt::Display for ProcessEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProcessEvent {
    type Err = ExitHookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(event) = ProcessEvent::LIFECYCLE
            .into_iter()
            .find(|event| event.name() == s)
        {
            return Ok(event);
        }
        s.parse::<Signal>().map(ProcessEvent::Signal)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ProcessError
// ─────────────────────────────────────────────────────────────────────────────

/// How an error escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A panic that nothing caught.
    Panic,
    /// A failed asynchronous task whose result nobody observed.
    Rejection,
}

/// The error value handed to error hooks.
#[derive(Debug, Clone)]
pub struct ProcessError {
    kind: ErrorKind,
    message: String,
    location: Option<String>,
    source: Option<Arc<dyn core::error::Error + Send + Sync>>,
}

impl ProcessError {
    /// Creates an error describing an uncaught panic.
    pub fn panic(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Panic,
            message: message.into(),
            location: None,
            source: None,
        }
    }

    /// Creates an error describing an unhandled rejection.
    pub fn rejection(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Rejection,
            message: message.into(),
            location: None,
            source: None,
        }
    }

    /// Wraps a failed task's error as an unhandled rejection.
    pub fn from_error<E>(error: E) -> Self
    where
        E: core::error::Error + Send + Sync + 'static,
    {
        Self {
            kind: ErrorKind::Rejection,
            message: error.to_string(),
            location: None,
            source: Some(Arc::new(error)),
        }
    }

    /// Attaches a source location, e.g. `src/main.rs:10:5`.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Returns how the error escaped.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the source location, if known.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.location) {
            (ErrorKind::Panic, Some(location)) => {
                write!(f, "panicked at {location}: {}", self.message)
            }
            (ErrorKind::Panic, None) => write!(f, "panicked: {}", self.message),
            (ErrorKind::Rejection, _) => write!(f, "unhandled rejection: {}", self.message),
        }
    }
}

impl core::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn core::error::Error + 'static))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventArgs
// ─────────────────────────────────────────────────────────────────────────────

/// Settlement that happened more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveKind {
    /// Resolved again.
    Resolve,
    /// Rejected after settling.
    Reject,
}

/// One occurrence of a [`ProcessEvent`] with its payload.
///
/// Filters registered with
/// [`hook_event_with_filter`](crate::ExitHooks::hook_event_with_filter)
/// receive `&EventArgs` and match on the variant they care about.
#[derive(Debug, Clone)]
pub enum EventArgs {
    /// See [`ProcessEvent::BeforeExit`].
    BeforeExit {
        /// The exit code the process is heading for.
        code: i32,
    },
    /// See [`ProcessEvent::Disconnect`].
    Disconnect,
    /// See [`ProcessEvent::Exit`].
    Exit {
        /// The exit code the process is heading for.
        code: i32,
    },
    /// See [`ProcessEvent::RejectionHandled`].
    RejectionHandled {
        /// The rejection that was eventually handled.
        error: ProcessError,
    },
    /// See [`ProcessEvent::UncaughtException`].
    UncaughtException {
        /// The uncaught error.
        error: ProcessError,
    },
    /// See [`ProcessEvent::UnhandledRejection`].
    UnhandledRejection {
        /// The rejection reason.
        error: ProcessError,
    },
    /// See [`ProcessEvent::Warning`].
    Warning {
        /// The warning text.
        message: String,
    },
    /// See [`ProcessEvent::Message`].
    Message {
        /// The received message.
        message: serde_json::Value,
    },
    /// See [`ProcessEvent::NewListener`].
    NewListener {
        /// The event a listener was added for.
        event: ProcessEvent,
    },
    /// See [`ProcessEvent::RemoveListener`].
    RemoveListener {
        /// The event a listener was removed from.
        event: ProcessEvent,
    },
    /// See [`ProcessEvent::MultipleResolves`].
    MultipleResolves {
        /// How the handle was settled again.
        kind: ResolveKind,
        /// Description of the extra settlement.
        reason: String,
    },
    /// See [`ProcessEvent::Signal`].
    Signal {
        /// The delivered signal.
        signal: Signal,
    },
}

impl EventArgs {
    /// Creates a [`Message`](Self::Message) occurrence.
    pub fn message(message: impl Into<serde_json::Value>) -> Self {
        EventArgs::Message {
            message: message.into(),
        }
    }

    /// Returns the event this occurrence belongs to.
    #[must_use]
    pub fn event(&self) -> ProcessEvent {
        match self {
            EventArgs::BeforeExit { .. } => ProcessEvent::BeforeExit,
            EventArgs::Disconnect => ProcessEvent::Disconnect,
            EventArgs::Exit { .. } => ProcessEvent::Exit,
            EventArgs::RejectionHandled { .. } => ProcessEvent::RejectionHandled,
            EventArgs::UncaughtException { .. } => ProcessEvent::UncaughtException,
            EventArgs::UnhandledRejection { .. } => ProcessEvent::UnhandledRejection,
            EventArgs::Warning { .. } => ProcessEvent::Warning,
            EventArgs::Message { .. } => ProcessEvent::Message,
            EventArgs::NewListener { .. } => ProcessEvent::NewListener,
            EventArgs::RemoveListener { .. } => ProcessEvent::RemoveListener,
            EventArgs::MultipleResolves { .. } => ProcessEvent::MultipleResolves,
            EventArgs::Signal { signal } => ProcessEvent::Signal(*signal),
        }
    }
}

impl From<Signal> for EventArgs {
    fn from(signal: Signal) -> Self {
        EventArgs::Signal { signal }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::error::Error as _;

    #[test]
    fn event_names_round_trip() {
        let all = ProcessEvent::LIFECYCLE
            .into_iter()
            .chain(Signal::ALL.into_iter().map(ProcessEvent::Signal));
        for event in all {
            let parsed: ProcessEvent = event.to_string().parse().unwrap();
            assert_eq!(parsed, event);
        }
    }

    #[test]
    fn parses_conventional_names() {
        assert_eq!(
            "beforeExit".parse::<ProcessEvent>().unwrap(),
            ProcessEvent::BeforeExit
        );
        assert_eq!(
            "SIGBREAK".parse::<ProcessEvent>().unwrap(),
            ProcessEvent::Signal(Signal::Break)
        );
    }

    #[test]
    fn rejects_unknown_and_uncatchable_names() {
        assert_eq!(
            "beforeexit".parse::<ProcessEvent>().unwrap_err(),
            ExitHookError::UnknownEvent("beforeexit".into())
        );
        assert_eq!(
            "SIGKILL".parse::<ProcessEvent>().unwrap_err(),
            ExitHookError::UncatchableSignal("SIGKILL".into())
        );
    }

    #[test]
    fn signal_exit_codes_follow_shell_convention() {
        assert_eq!(Signal::Hup.exit_code(), 129);
        assert_eq!(Signal::Int.exit_code(), 130);
        assert_eq!(Signal::Term.exit_code(), 143);
        assert_eq!(Signal::Break.exit_code(), 149);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn user_signal_numbers_on_linux() {
        assert_eq!(Signal::Usr1.exit_code(), 138);
        assert_eq!(Signal::Usr2.number(), 12);
        assert_eq!(Signal::Chld.number(), 17);
    }

    #[test]
    #[cfg(target_vendor = "apple")]
    fn user_signal_numbers_on_macos() {
        assert_eq!(Signal::Usr1.exit_code(), 158);
        assert_eq!(Signal::Usr2.number(), 31);
        assert_eq!(Signal::Chld.number(), 20);
    }

    #[test]
    fn event_args_map_to_their_event() {
        assert_eq!(
            EventArgs::from(Signal::Usr1).event(),
            ProcessEvent::Signal(Signal::Usr1)
        );
        assert_eq!(EventArgs::Exit { code: 3 }.event(), ProcessEvent::Exit);
        assert_eq!(
            EventArgs::UnhandledRejection {
                error: ProcessError::rejection("nope")
            }
            .event(),
            ProcessEvent::UnhandledRejection
        );
    }

    #[test]
    fn process_error_display_and_source() {
        let panic = ProcessError::panic("boom").with_location("src/main.rs:3:5");
        assert_eq!(panic.to_string(), "panicked at src/main.rs:3:5: boom");
        assert_eq!(panic.kind(), ErrorKind::Panic);
        assert!(panic.source().is_none());

        let io = std::io::Error::other("disk full");
        let rejection = ProcessError::from_error(io);
        assert_eq!(rejection.to_string(), "unhandled rejection: disk full");
        assert_eq!(rejection.kind(), ErrorKind::Rejection);
        assert_eq!(rejection.source().unwrap().to_string(), "disk full");
    }
}
