//! End-to-end exit sequences against a recording terminator.

use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;
use std::sync::{Arc, Mutex};

use crate::{
    Dispatch, DrainOutcome, ErrorHook, EventArgs, ExitHooks, Phase, ProcessError, ProcessEvent,
    RecordingTerminator, Signal,
};

fn registry(default_events: bool) -> (ExitHooks, Arc<RecordingTerminator>) {
    let terminator = Arc::new(RecordingTerminator::new());
    let hooks = ExitHooks::builder()
        .with_default_events(default_events)
        .with_terminator(terminator.clone())
        .build();
    (hooks, terminator)
}

/// Shared log of which hooks ran, in order.
#[derive(Clone, Default)]
struct Trace(Arc<Mutex<Vec<&'static str>>>);

impl Trace {
    fn push(&self, entry: &'static str) {
        self.0.lock().unwrap().push(entry);
    }

    fn entries(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

#[tokio::test(start_paused = true)]
async fn sigint_runs_sync_hook_and_exits_130() {
    let (hooks, terminator) = registry(true);
    let trace = Trace::default();
    let t = trace.clone();
    hooks.add_sync(move || t.push("cleanup"));

    let report = hooks
        .emit(EventArgs::from(Signal::Int))
        .await
        .into_report()
        .unwrap();

    assert_eq!(trace.entries(), vec!["cleanup"]);
    assert_eq!(report.event, ProcessEvent::Signal(Signal::Int));
    assert_eq!(report.code, Some(130));
    assert_eq!(report.drain.outcome, DrainOutcome::Settled);
    assert_eq!(terminator.codes(), vec![130]);
    assert_eq!(hooks.phase(), Phase::Terminating);
}

#[tokio::test(start_paused = true)]
async fn async_hooks_are_awaited_concurrently() {
    let (hooks, terminator) = registry(true);
    let trace = Trace::default();

    let t = trace.clone();
    hooks.add_future(move || {
        let t = t.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            t.push("fast");
        }
    });
    let t = trace.clone();
    hooks.add_callback(move |step| {
        let t = t.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            t.push("slow");
            step.done();
        });
    });

    let report = hooks
        .emit(EventArgs::from(Signal::Term))
        .await
        .into_report()
        .unwrap();

    assert_eq!(trace.entries(), vec!["fast", "slow"]);
    assert_eq!(report.drain.async_hooks, 2);
    assert!(!report.drain.is_forced());
    assert!(report.drain.elapsed >= Duration::from_millis(50));
    assert!(report.drain.elapsed < Duration::from_millis(60));
    assert_eq!(terminator.codes(), vec![143]);
}

#[tokio::test(start_paused = true)]
async fn force_exit_timeout_cuts_draining_short() {
    let (hooks, terminator) = registry(true);
    hooks.set_force_exit_timeout(100).unwrap();
    hooks.add_callback(|step| {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            step.done();
        });
    });

    let report = hooks
        .emit(EventArgs::from(Signal::Hup))
        .await
        .into_report()
        .unwrap();

    assert_eq!(report.drain.outcome, DrainOutcome::TimedOut { pending: 1 });
    assert!(report.drain.elapsed >= Duration::from_millis(100));
    assert!(report.drain.elapsed < Duration::from_millis(110));
    assert_eq!(terminator.codes(), vec![129]);
}

#[tokio::test(start_paused = true)]
async fn hooks_run_exactly_once() {
    let (hooks, terminator) = registry(true);
    let runs = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&runs);
    hooks.add_sync(move || {
        r.fetch_add(1, Ordering::SeqCst);
    });

    assert!(hooks.emit(EventArgs::from(Signal::Int)).await.is_exited());
    assert_eq!(
        hooks.emit(EventArgs::from(Signal::Term)).await,
        Dispatch::AlreadyExiting
    );
    assert_eq!(
        hooks
            .report_uncaught_exception(ProcessError::panic("late"))
            .await,
        Dispatch::AlreadyExiting
    );

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(terminator.codes(), vec![130]);
}

#[tokio::test(start_paused = true)]
async fn second_event_while_draining_is_ignored() {
    let (hooks, terminator) = registry(true);
    hooks.add_future(|| tokio::time::sleep(Duration::from_millis(20)));

    let first = tokio::spawn({
        let hooks = hooks.clone();
        async move { hooks.emit(EventArgs::from(Signal::Int)).await }
    });
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(hooks.phase(), Phase::Draining);

    assert_eq!(
        hooks.emit(EventArgs::from(Signal::Term)).await,
        Dispatch::AlreadyExiting
    );
    assert!(first.await.unwrap().is_exited());
    assert_eq!(terminator.codes(), vec![130]);
}

#[tokio::test(start_paused = true)]
async fn filter_can_veto_an_occurrence() {
    let (hooks, terminator) = registry(false);
    let runs = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&runs);
    hooks.add_sync(move || {
        r.fetch_add(1, Ordering::SeqCst);
    });
    hooks.hook_event_with_filter(Signal::Usr1, Some(3), |_| true);

    assert_eq!(
        hooks.emit(EventArgs::from(Signal::Usr1)).await,
        Dispatch::Vetoed
    );
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(terminator.codes().is_empty());
    assert_eq!(hooks.phase(), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn filters_accumulate_across_rehooks() {
    let (hooks, terminator) = registry(false);
    hooks.add_sync(|| {});
    hooks.hook_event_with_filter(ProcessEvent::Warning, Some(2), |args| {
        matches!(args, EventArgs::Warning { message } if message.contains("deprecated"))
    });
    hooks.hook_event_with_filter(ProcessEvent::Warning, Some(4), |args| {
        matches!(args, EventArgs::Warning { message } if message.contains("experimental"))
    });

    let warning = |message: &str| EventArgs::Warning {
        message: message.to_string(),
    };
    assert_eq!(hooks.emit(warning("deprecated API")).await, Dispatch::Vetoed);
    assert_eq!(hooks.emit(warning("experimental API")).await, Dispatch::Vetoed);

    let report = hooks
        .emit(warning("disk almost full"))
        .await
        .into_report()
        .unwrap();
    assert_eq!(report.code, Some(4));
    assert_eq!(terminator.codes(), vec![4]);
}

#[tokio::test(start_paused = true)]
async fn panicking_filter_does_not_veto() {
    let (hooks, terminator) = registry(false);
    hooks.hook_event_with_filter(Signal::Usr2, Some(9), |_| panic!("broken filter"));

    assert!(hooks.emit(EventArgs::from(Signal::Usr2)).await.is_exited());
    assert_eq!(terminator.codes(), vec![9]);
}

#[tokio::test(start_paused = true)]
async fn unhooked_events_are_ignored() {
    let (hooks, terminator) = registry(false);
    hooks.add_sync(|| {});

    assert_eq!(
        hooks.emit(EventArgs::from(Signal::Int)).await,
        Dispatch::Unhooked
    );

    hooks.hook_event(Signal::Int, Some(1));
    hooks.unhook_event(Signal::Int);
    assert_eq!(
        hooks.emit(EventArgs::from(Signal::Int)).await,
        Dispatch::Unhooked
    );
    assert!(terminator.codes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn exit_event_without_code_does_not_terminate() {
    let (hooks, terminator) = registry(true);
    let trace = Trace::default();
    let t = trace.clone();
    hooks.add_sync(move || t.push("cleanup"));

    let report = hooks
        .emit(EventArgs::Exit { code: 0 })
        .await
        .into_report()
        .unwrap();

    assert_eq!(report.code, None);
    assert_eq!(trace.entries(), vec!["cleanup"]);
    assert!(terminator.codes().is_empty());
    assert_eq!(hooks.phase(), Phase::Terminating);
}

#[tokio::test(start_paused = true)]
async fn only_the_shutdown_message_triggers_exit() {
    let (hooks, terminator) = registry(true);
    hooks.add_sync(|| {});

    assert_eq!(
        hooks.emit(EventArgs::message("reload")).await,
        Dispatch::Vetoed
    );
    assert!(hooks.emit(EventArgs::message("shutdown")).await.is_exited());
    assert_eq!(terminator.codes(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn before_exit_exits_zero() {
    let (hooks, terminator) = registry(true);
    hooks.add_sync(|| {});

    assert!(
        hooks
            .emit(EventArgs::BeforeExit { code: 0 })
            .await
            .is_exited()
    );
    assert_eq!(terminator.codes(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn panicking_hook_does_not_stop_the_others() {
    let (hooks, terminator) = registry(true);
    let trace = Trace::default();
    hooks.add_sync(|| panic!("hook failed"));
    let t = trace.clone();
    hooks.add_sync(move || t.push("second"));

    let report = hooks
        .emit(EventArgs::from(Signal::Term))
        .await
        .into_report()
        .unwrap();

    assert_eq!(trace.entries(), vec!["second"]);
    assert_eq!(report.drain.failed, 1);
    assert_eq!(terminator.codes(), vec![143]);
}

#[tokio::test(start_paused = true)]
async fn hook_that_never_signals_is_forced_out_at_the_timeout() {
    let (hooks, terminator) = registry(true);
    hooks.set_force_exit_timeout(100).unwrap();
    hooks.add_callback(|_step| {});

    let report = hooks
        .emit(EventArgs::from(Signal::Term))
        .await
        .into_report()
        .unwrap();

    assert_eq!(report.drain.async_hooks, 1);
    assert_eq!(report.drain.failed, 0);
    assert_eq!(report.drain.outcome, DrainOutcome::TimedOut { pending: 1 });
    assert!(report.drain.elapsed >= Duration::from_millis(100));
    assert!(report.drain.elapsed < Duration::from_millis(110));
    assert_eq!(terminator.codes(), vec![143]);
}

#[tokio::test(start_paused = true)]
async fn uncaught_exception_runs_error_hooks_first() {
    let (hooks, terminator) = registry(true);
    let trace = Trace::default();
    let seen = Arc::new(Mutex::new(None));

    let t = trace.clone();
    hooks.add_sync(move || t.push("hook"));
    let t = trace.clone();
    let s = Arc::clone(&seen);
    hooks.uncaught_exception_handler(ErrorHook::sync(move |error| {
        *s.lock().unwrap() = Some(error.to_string());
        t.push("uncaught");
    }));
    let t = trace.clone();
    hooks.unhandled_rejection_handler(ErrorHook::sync(move |_| t.push("rejection")));

    let report = hooks
        .report_uncaught_exception(ProcessError::panic("boom").with_location("src/main.rs:3:5"))
        .await
        .into_report()
        .unwrap();

    assert_eq!(trace.entries(), vec!["uncaught", "hook"]);
    assert_eq!(
        seen.lock().unwrap().as_deref(),
        Some("panicked at src/main.rs:3:5: boom")
    );
    assert_eq!(report.event, ProcessEvent::UncaughtException);
    assert_eq!(report.code, Some(1));
    assert_eq!(terminator.codes(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn unhandled_rejection_runs_every_error_hook() {
    let (hooks, terminator) = registry(false);
    let trace = Trace::default();

    let t = trace.clone();
    hooks.add_sync(move || t.push("hook"));
    let t = trace.clone();
    hooks.unhandled_rejection_handler(ErrorHook::sync(move |_| t.push("rejection")));
    let t = trace.clone();
    hooks.uncaught_exception_handler(ErrorHook::future(move |error| {
        let t = t.clone();
        async move {
            assert_eq!(error.message(), "connection reset");
            tokio::time::sleep(Duration::from_millis(5)).await;
            t.push("uncaught");
        }
    }));

    let report = hooks
        .emit(EventArgs::UnhandledRejection {
            error: ProcessError::rejection("connection reset"),
        })
        .await
        .into_report()
        .unwrap();

    assert_eq!(trace.entries(), vec!["rejection", "hook", "uncaught"]);
    assert_eq!(report.drain.hooks_run, 3);
    assert_eq!(report.event, ProcessEvent::UnhandledRejection);
    assert_eq!(terminator.codes(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn error_exit_code_follows_the_subscription() {
    let (hooks, terminator) = registry(false);
    hooks.hook_event(ProcessEvent::UncaughtException, Some(70));

    assert!(
        hooks
            .report_uncaught_exception(ProcessError::panic("boom"))
            .await
            .is_exited()
    );
    assert_eq!(terminator.codes(), vec![70]);
}

#[tokio::test(start_paused = true)]
async fn error_filter_can_veto() {
    let (hooks, terminator) = registry(false);
    let called = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&called);
    hooks.uncaught_exception_handler(ErrorHook::sync(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    }));
    hooks.hook_event_with_filter(ProcessEvent::UnhandledRejection, None, |args| {
        matches!(args, EventArgs::UnhandledRejection { error } if error.message() == "expected")
    });

    assert_eq!(
        hooks
            .report_unhandled_rejection(ProcessError::rejection("expected"))
            .await,
        Dispatch::Vetoed
    );
    assert_eq!(called.load(Ordering::SeqCst), 0);
    assert!(terminator.codes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn hooks_may_use_the_registry_while_draining() {
    let (hooks, terminator) = registry(true);
    let handle = hooks.clone();
    let observed = Arc::new(Mutex::new(None));
    let o = Arc::clone(&observed);
    hooks.add_sync(move || {
        *o.lock().unwrap() = Some((handle.phase(), handle.hooked_events().len()));
        handle.unhook_event(Signal::Int);
    });

    assert!(hooks.emit(EventArgs::from(Signal::Int)).await.is_exited());
    assert_eq!(*observed.lock().unwrap(), Some((Phase::Draining, 7)));
    assert!(!hooks.is_hooked(Signal::Int));
    assert_eq!(terminator.codes(), vec![130]);
}

#[tokio::test(start_paused = true)]
async fn wait_for_termination_resolves_after_draining() {
    let (hooks, terminator) = registry(true);
    hooks.add_future(|| tokio::time::sleep(Duration::from_millis(30)));

    let waiter = tokio::spawn({
        let hooks = hooks.clone();
        async move { hooks.wait_for_termination().await }
    });
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    hooks.emit(EventArgs::from(Signal::Term)).await;
    waiter.await.unwrap();
    assert_eq!(terminator.terminated().await, 143);
}
