//! Property-based tests for the exit sequence.
//!
//! Randomly generated hook lists and subscription edits are checked against
//! simple models:
//!
//! - **Ordering**: hooks are started in registration order, whatever mix of
//!   synchronous and asynchronous hooks is registered.
//! - **Timeout bound**: draining takes as long as the slowest asynchronous
//!   hook, capped by the force-exit timeout, and is reported as forced exactly
//!   when a hook outlives the timeout.
//! - **Subscriptions**: `hooked_events` always equals a first-hooked-order
//!   list model under any sequence of hook and unhook calls.
//!
//! Time is paused, so the delays below cost nothing to run.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use exit_hook_core::{EventArgs, ExitHooks, ProcessEvent, Signal, Terminator};
use proptest::prelude::*;

/// Terminator that ignores the exit code.
struct Discard;

impl Terminator for Discard {
    fn terminate(&self, _code: i32) {}
}

fn registry() -> ExitHooks {
    ExitHooks::builder()
        .with_default_events(false)
        .with_terminator(Arc::new(Discard))
        .build()
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("tokio runtime")
}

#[derive(Clone, Debug)]
enum HookSpec {
    Sync,
    /// Asynchronous hook finishing after the given delay in milliseconds.
    Async(u64),
}

fn arb_hook() -> impl Strategy<Value = HookSpec> {
    prop_oneof![
        Just(HookSpec::Sync),
        (0..20u64).prop_map(|tens| HookSpec::Async(tens * 10)),
    ]
}

#[derive(Clone, Debug)]
enum Edit {
    Hook(ProcessEvent),
    Unhook(ProcessEvent),
}

fn arb_event() -> impl Strategy<Value = ProcessEvent> {
    prop_oneof![
        prop::sample::select(ProcessEvent::LIFECYCLE.to_vec()),
        prop::sample::select(Signal::ALL.to_vec()).prop_map(ProcessEvent::Signal),
    ]
}

fn arb_edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        2 => arb_event().prop_map(Edit::Hook),
        1 => arb_event().prop_map(Edit::Unhook),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Hooks start in registration order.
    #[test]
    fn prop_hooks_start_in_registration_order(specs in prop::collection::vec(arb_hook(), 1..12)) {
        let started = Arc::new(Mutex::new(Vec::new()));
        let hooks = registry();
        hooks.hook_event(Signal::Term, Some(143));

        for (index, spec) in specs.iter().cloned().enumerate() {
            let started = Arc::clone(&started);
            match spec {
                HookSpec::Sync => {
                    hooks.add_sync(move || started.lock().unwrap().push(index));
                }
                HookSpec::Async(delay) => {
                    hooks.add_future(move || {
                        started.lock().unwrap().push(index);
                        tokio::time::sleep(Duration::from_millis(delay))
                    });
                }
            }
        }

        let report = paused_runtime()
            .block_on(hooks.emit(EventArgs::from(Signal::Term)))
            .into_report()
            .expect("exit sequence ran");

        let expected: Vec<usize> = (0..specs.len()).collect();
        prop_assert_eq!(started.lock().unwrap().clone(), expected);
        prop_assert_eq!(report.drain.hooks_run, specs.len());
        prop_assert_eq!(report.code, Some(143));
    }

    /// Draining waits for the slowest hook, never longer than the timeout.
    #[test]
    fn prop_drain_is_bounded_by_slowest_hook_and_timeout(
        specs in prop::collection::vec(arb_hook(), 0..8),
        timeout_tens in 0..20u64,
    ) {
        // Offset by 5ms so no hook finishes at exactly the deadline.
        let timeout = timeout_tens * 10 + 5;
        let hooks = registry();
        hooks.hook_event(ProcessEvent::Disconnect, None);
        hooks.set_force_exit_timeout(timeout).expect("timeout in range");

        let mut slowest = None;
        for spec in &specs {
            match *spec {
                HookSpec::Sync => {
                    hooks.add_sync(|| {});
                }
                HookSpec::Async(delay) => {
                    slowest = slowest.max(Some(delay));
                    hooks.add_future(move || tokio::time::sleep(Duration::from_millis(delay)));
                }
            }
        }

        let report = paused_runtime()
            .block_on(hooks.emit(EventArgs::Disconnect))
            .into_report()
            .expect("exit sequence ran");

        let expected = match slowest {
            None => 0,
            Some(slowest) => slowest.min(timeout),
        };
        let elapsed = report.drain.elapsed;
        prop_assert!(elapsed >= Duration::from_millis(expected), "elapsed {:?}", elapsed);
        prop_assert!(elapsed < Duration::from_millis(expected + 5), "elapsed {:?}", elapsed);
        prop_assert_eq!(report.drain.is_forced(), slowest.is_some_and(|s| s > timeout));
    }

    /// `hooked_events` matches a first-hooked-order model.
    #[test]
    fn prop_hooked_events_follow_edits(edits in prop::collection::vec(arb_edit(), 0..40)) {
        let hooks = registry();
        let mut model: Vec<ProcessEvent> = Vec::new();

        for edit in edits {
            match edit {
                Edit::Hook(event) => {
                    hooks.hook_event(event, Some(1));
                    if !model.contains(&event) {
                        model.push(event);
                    }
                }
                Edit::Unhook(event) => {
                    hooks.unhook_event(event);
                    model.retain(|e| *e != event);
                }
            }
            prop_assert_eq!(hooks.hooked_events(), model.clone());
        }

        prop_assert_eq!(hooks.watch_events().borrow().clone(), model);
    }
}
