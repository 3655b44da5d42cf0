//! Run cleanup hooks, including asynchronous ones, before a process exits.
//!
//! Re-exports [`exit_hook_core`] (the registry) and, with the default `host`
//! feature, [`exit_hook_host`] (signals, panics and supervised tasks).

pub use exit_hook_core::*;

/// Host integration.
#[cfg(feature = "host")]
pub use exit_hook_host as host;

#[cfg(feature = "host")]
pub use exit_hook_host::{EventSender, Host, HostError, TracingConfig, TracingFormat};

/// Re-export all common types for easy access.
pub mod prelude {
    pub use exit_hook_core::prelude::*;

    #[cfg(feature = "host")]
    pub use exit_hook_host::prelude::*;
}
