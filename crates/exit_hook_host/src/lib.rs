//! Host integration for `exit_hook_core`.
//!
//! [`Host`] connects an [`ExitHooks`](exit_hook_core::ExitHooks) registry to
//! the running process: OS signals become [`EventArgs`](exit_hook_core::EventArgs),
//! panics escaping the main future or a supervised task become uncaught
//! exceptions, and failed supervised tasks become unhandled rejections.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use exit_hook_core::{ExitHookConfig, ExitHooks};
//! use exit_hook_host::{Host, TracingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     TracingConfig::default().init();
//!
//!     let hooks = ExitHooks::with_config(ExitHookConfig::from_env()?);
//!     hooks.add_future(|| async {
//!         tokio::time::sleep(Duration::from_millis(50)).await;
//!         tracing::info!("connections drained");
//!     });
//!
//!     let host = Host::install(&hooks)?;
//!     host.run(async {
//!         // serve until SIGINT / SIGTERM
//!         std::future::pending::<()>().await;
//!     })
//!     .await;
//!     Ok(())
//! }
//! ```

/// Host integration errors.
pub mod error;

/// The installed host.
pub mod host;

/// Opt-in panic hook integration.
pub mod panic;

/// Signal listeners.
mod signals;

/// Tracing subscriber setup.
pub mod tracing_setup;

/// Event delivery handle.
pub mod trigger;

pub use error::HostError;
pub use host::Host;
pub use panic::payload_message;
pub use tracing_setup::{TracingConfig, TracingFormat};
pub use trigger::EventSender;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::error::HostError;
    pub use crate::host::Host;
    pub use crate::tracing_setup::{TracingConfig, TracingFormat};
    pub use crate::trigger::EventSender;
}
