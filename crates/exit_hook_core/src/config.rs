//! Registry configuration.
//!
//! [`ExitHookConfig`] holds the force-exit timeout and whether the default
//! event set is subscribed when the first hook is registered. It can be
//! built in code, deserialized, or read from the environment.
//!
//! # Environment
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `EXIT_HOOK_FORCE_EXIT_TIMEOUT_MS` | Force-exit timeout in milliseconds |
//! | `EXIT_HOOK_DEFAULT_EVENTS` | `true`/`false`: subscribe the default events |

use serde::{Deserialize, Serialize};

use crate::error::ExitHookError;
use crate::timeout::ForceExitTimeout;

/// Environment variable holding the force-exit timeout in milliseconds.
pub const FORCE_EXIT_TIMEOUT_ENV: &str = "EXIT_HOOK_FORCE_EXIT_TIMEOUT_MS";

/// Environment variable toggling the default event subscriptions.
pub const DEFAULT_EVENTS_ENV: &str = "EXIT_HOOK_DEFAULT_EVENTS";

/// Configuration for an [`ExitHooks`](crate::ExitHooks) registry.
///
/// # Example
///
/// ```
/// use exit_hook_core::{ExitHookConfig, ForceExitTimeout};
///
/// let config = ExitHookConfig::default()
///     .with_force_exit_timeout(ForceExitTimeout::from_millis(2_000).unwrap())
///     .with_default_events(false);
/// assert_eq!(config.force_exit_timeout.as_millis(), 2_000);
///
/// let parsed: ExitHookConfig =
///     serde_json::from_str(r#"{ "force_exit_timeout_ms": 500 }"#).unwrap();
/// assert!(parsed.hook_default_events);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExitHookConfig {
    /// How long draining waits for asynchronous hooks.
    #[serde(rename = "force_exit_timeout_ms")]
    pub force_exit_timeout: ForceExitTimeout,
    /// Subscribe the default events when the first hook is registered.
    pub hook_default_events: bool,
}

impl Default for ExitHookConfig {
    fn default() -> Self {
        Self {
            force_exit_timeout: ForceExitTimeout::DEFAULT,
            hook_default_events: true,
        }
    }
}

impl ExitHookConfig {
    /// Sets the force-exit timeout.
    #[must_use]
    pub fn with_force_exit_timeout(mut self, timeout: ForceExitTimeout) -> Self {
        self.force_exit_timeout = timeout;
        self
    }

    /// Enables or disables the default event subscriptions.
    #[must_use]
    pub fn with_default_events(mut self, enabled: bool) -> Self {
        self.hook_default_events = enabled;
        self
    }

    /// Reads the configuration from the process environment.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparsable value or the
    /// timeout is out of range.
    pub fn from_env() -> Result<Self, ExitHookError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ExitHookError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(FORCE_EXIT_TIMEOUT_ENV) {
            let millis = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ExitHookError::invalid_config(FORCE_EXIT_TIMEOUT_ENV, raw.as_str()))?;
            config.force_exit_timeout = ForceExitTimeout::from_millis(millis)?;
        }

        if let Some(raw) = lookup(DEFAULT_EVENTS_ENV) {
            config.hook_default_events = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ExitHookError::invalid_config(DEFAULT_EVENTS_ENV, raw)),
            };
        }

        Ok(config)
    }
}
