//! Real signals delivered to the test process.
#![cfg(unix)]

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use exit_hook_core::{ExitHooks, RecordingTerminator, Signal};
use exit_hook_host::Host;

fn kill(signal: &str) {
    let status = Command::new("kill")
        .args(["-s", signal, &std::process::id().to_string()])
        .status()
        .expect("run kill");
    assert!(status.success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscribed_signal_terminates_with_its_code() {
    let terminator = Arc::new(RecordingTerminator::new());
    let hooks = ExitHooks::builder()
        .with_default_events(false)
        .with_terminator(terminator.clone())
        .build();
    hooks.add_sync(|| {});
    hooks.hook_event(Signal::Usr1, Some(7));

    let _host = Host::install(&hooks).unwrap();

    // Follow subscription changes made after install.
    hooks.unhook_event(Signal::Usr1);
    hooks.hook_event(Signal::Usr2, Some(42));
    tokio::time::sleep(Duration::from_millis(50)).await;

    kill("USR1");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(terminator.codes().is_empty());

    kill("USR2");
    let code = tokio::time::timeout(Duration::from_secs(5), terminator.terminated())
        .await
        .expect("terminated in time");
    assert_eq!(code, 42);
}
