//! Example service CLI.
//!
//! Runs simulated jobs until interrupted, then drains the running jobs
//! before exiting.
//!
//! # Usage
//!
//! ```bash
//! graceful [jobs]
//! ```
//!
//! Press Ctrl+C while jobs are running to watch them drain. Set
//! `EXIT_HOOK_FORCE_EXIT_TIMEOUT_MS` to shorten the drain, and `fail` as the
//! job count to see a failed task reported as an unhandled rejection.

use std::time::Duration;

use example::{JobError, JobQueue};
use exit_hook_core::{ExitHookConfig, ExitHooks};
use exit_hook_host::{Host, TracingConfig};

#[tokio::main]
async fn main() {
    TracingConfig::default().init();

    let config = match ExitHookConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "invalid configuration");
            std::process::exit(2);
        }
    };
    let hooks = ExitHooks::with_config(config);

    let queue = JobQueue::new();
    queue.register(&hooks);

    let host = match Host::install(&hooks) {
        Ok(host) => host,
        Err(error) => {
            tracing::error!(%error, "failed to install exit hooks");
            std::process::exit(2);
        }
    };

    let arg = std::env::args().nth(1);
    if arg.as_deref() == Some("fail") {
        host.spawn(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Err::<(), _>(JobError::Failed {
                id: 0,
                reason: "upstream unavailable".to_string(),
            })
        });
    }
    let jobs: u64 = arg.and_then(|arg| arg.parse().ok()).unwrap_or(20);

    host.run(async move {
        for id in 0..jobs {
            let queue = queue.clone();
            tokio::spawn(async move {
                if let Err(error) = queue.run(id, Duration::from_millis(500 + id * 100)).await {
                    tracing::warn!(id, %error, "job rejected");
                }
            });
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    })
    .await;
}
