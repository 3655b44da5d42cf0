//! Error types for registry configuration and event parsing.

use thiserror::Error;

/// Errors returned by the exit hook registry.
///
/// Registering hooks never fails; these errors come from configuration
/// (the force-exit timeout) and from parsing event names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExitHookError {
    /// The force-exit timeout is larger than a signed 32-bit millisecond count.
    #[error("force-exit timeout of {millis}ms exceeds the maximum of {max}ms")]
    TimeoutOutOfRange {
        /// The rejected value.
        millis: u64,
        /// The largest accepted value.
        max: u64,
    },

    /// The name does not match any lifecycle event or catchable signal.
    #[error("unknown process event or signal: {0}")]
    UnknownEvent(String),

    /// The signal exists but cannot be caught by a process.
    #[error("signal {0} cannot be caught")]
    UncatchableSignal(String),

    /// A configuration value could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidConfig {
        /// The configuration key (environment variable name).
        key: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },
}

impl ExitHookError {
    /// Creates an [`InvalidConfig`](Self::InvalidConfig).
    pub fn invalid_config(key: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key,
            value: value.into(),
        }
    }
}
