//! Host integration errors.

use std::io;

use exit_hook_core::Signal;
use thiserror::Error;

/// Errors returned while installing a [`Host`](crate::Host).
#[derive(Debug, Error)]
pub enum HostError {
    /// `Host::install` was called outside a tokio runtime.
    #[error("no tokio runtime is running; install the host from within a runtime")]
    NoRuntime,

    /// A host is already installed in this process.
    #[error("an exit hook host is already installed in this process")]
    AlreadyInstalled,

    /// Registering a native signal listener failed.
    #[error("failed to listen for {signal}")]
    Signal {
        /// The signal being registered.
        signal: Signal,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The signal cannot be listened for on this platform.
    #[error("{0} is not supported on this platform")]
    UnsupportedSignal(Signal),
}
