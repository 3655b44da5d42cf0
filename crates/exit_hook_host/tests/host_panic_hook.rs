//! Panics on plain threads, reported through the opt-in panic hook.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use exit_hook_core::{ErrorHook, ErrorKind, ExitHooks, RecordingTerminator};
use exit_hook_host::Host;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn thread_panic_runs_uncaught_exception_hooks() {
    let terminator = Arc::new(RecordingTerminator::new());
    let hooks = ExitHooks::builder()
        .with_terminator(terminator.clone())
        .build();
    let seen = Arc::new(Mutex::new(None));

    let s = Arc::clone(&seen);
    hooks.uncaught_exception_handler(ErrorHook::sync(move |error| {
        *s.lock().unwrap() = Some(error.clone());
    }));
    hooks.add_sync(|| {});

    let host = Host::install(&hooks).unwrap();
    assert!(host.install_panic_hook());
    assert!(!host.install_panic_hook());

    let worker = std::thread::spawn(|| panic!("thread exploded"));
    assert!(worker.join().is_err());

    let code = tokio::time::timeout(Duration::from_secs(5), terminator.terminated())
        .await
        .expect("terminated in time");
    assert_eq!(code, 1);

    let error = seen.lock().unwrap().clone().expect("error hook ran");
    assert_eq!(error.kind(), ErrorKind::Panic);
    assert_eq!(error.message(), "thread exploded");
    assert!(error.location().unwrap().contains("host_panic_hook.rs"));
}
