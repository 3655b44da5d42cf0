//! Panic hook reporting panics as uncaught exceptions.
//!
//! The hook sees every panic, including ones a `catch_unwind` or a
//! `JoinHandle` handles later, so it is only installed on request through
//! [`Host::install_panic_hook`](crate::Host::install_panic_hook).

use core::any::Any;
use core::sync::atomic::{AtomicBool, Ordering};
use std::panic;

use exit_hook_core::ProcessError;

use crate::trigger::EventSender;

/// Set once the reporting hook is in place.
static HOOKED: AtomicBool = AtomicBool::new(false);

/// Installs a panic hook that reports every panic through `sender`.
///
/// The previously installed hook runs first, so the usual panic message is
/// still printed. Returns `false` if the hook was already installed.
pub(crate) fn install(sender: EventSender) -> bool {
    if HOOKED.swap(true, Ordering::SeqCst) {
        return false;
    }

    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        previous(info);

        let mut error = ProcessError::panic(payload_message(info.payload()));
        if let Some(location) = info.location() {
            error = error.with_location(location.to_string());
        }
        sender.uncaught_exception(error);
    }));
    true
}

/// Extracts the message from a panic payload.
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}
