//! `Host::install` and `Host::run` on a normal shutdown.
//!
//! Each integration test file runs in its own process, which matters because
//! only one host can be installed per process.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use exit_hook_core::{ExitHooks, ProcessEvent, RecordingTerminator};
use exit_hook_host::{Host, HostError};

#[test]
fn install_requires_a_runtime() {
    let hooks = ExitHooks::new();
    assert!(matches!(Host::install(&hooks), Err(HostError::NoRuntime)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_drains_on_before_exit() {
    let terminator = Arc::new(RecordingTerminator::new());
    let hooks = ExitHooks::builder()
        .with_terminator(terminator.clone())
        .build();
    let trace = Arc::new(Mutex::new(Vec::new()));

    let t = Arc::clone(&trace);
    hooks.add_sync(move || t.lock().unwrap().push("sync hook"));
    let t = Arc::clone(&trace);
    hooks.add_future(move || {
        let t = Arc::clone(&t);
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            t.lock().unwrap().push("async hook");
        }
    });

    let host = Host::install(&hooks).unwrap();
    assert!(matches!(
        Host::install(&hooks),
        Err(HostError::AlreadyInstalled)
    ));
    assert!(!host.sender().is_closed());

    let t = Arc::clone(&trace);
    let report = host
        .run(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            t.lock().unwrap().push("main");
        })
        .await
        .unwrap();

    assert_eq!(
        *trace.lock().unwrap(),
        vec!["main", "sync hook", "async hook"]
    );
    assert_eq!(report.event, ProcessEvent::BeforeExit);
    assert_eq!(report.code, Some(0));
    assert_eq!(terminator.codes(), vec![0]);
}
