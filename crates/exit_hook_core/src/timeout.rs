//! The force-exit timeout.
//!
//! Bounds how long draining waits for asynchronous hooks before the process
//! is terminated regardless. The value is a millisecond count that must fit
//! in a signed 32-bit integer (about 25 days), which is the range host timers
//! accept without overflowing.

use core::fmt;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExitHookError;

/// Validated force-exit timeout in milliseconds.
///
/// # Example
///
/// ```
/// use exit_hook_core::ForceExitTimeout;
///
/// let timeout = ForceExitTimeout::from_millis(250).unwrap();
/// assert_eq!(timeout.as_millis(), 250);
///
/// assert!(ForceExitTimeout::from_millis(1 << 31).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ForceExitTimeout(u32);

impl ForceExitTimeout {
    /// Largest accepted value: `2^31 - 1` milliseconds.
    pub const MAX_MILLIS: u64 = i32::MAX as u64;

    /// Default timeout: 10 seconds.
    pub const DEFAULT: Self = Self(10_000);

    /// Creates a timeout from a millisecond count.
    ///
    /// # Errors
    ///
    /// Returns [`ExitHookError::TimeoutOutOfRange`] if `millis` exceeds
    /// [`MAX_MILLIS`](Self::MAX_MILLIS).
    pub fn from_millis(millis: u64) -> Result<Self, ExitHookError> {
        match u32::try_from(millis) {
            Ok(value) if millis <= Self::MAX_MILLIS => Ok(Self(value)),
            _ => Err(ExitHookError::TimeoutOutOfRange {
                millis,
                max: Self::MAX_MILLIS,
            }),
        }
    }

    /// Creates a timeout from a [`Duration`], truncated to whole milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`ExitHookError::TimeoutOutOfRange`] if the duration is longer
    /// than [`MAX_MILLIS`](Self::MAX_MILLIS) milliseconds.
    pub fn from_duration(duration: Duration) -> Result<Self, ExitHookError> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self::from_millis(millis)
    }

    /// Returns the timeout in milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 as u64
    }

    /// Returns the timeout as a [`Duration`].
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::from_millis(self.0 as u64)
    }
}

impl Default for ForceExitTimeout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for ForceExitTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl TryFrom<u64> for ForceExitTimeout {
    type Error = ExitHookError;

    fn try_from(millis: u64) -> Result<Self, Self::Error> {
        Self::from_millis(millis)
    }
}

impl From<ForceExitTimeout> for u64 {
    fn from(timeout: ForceExitTimeout) -> Self {
        timeout.as_millis()
    }
}
