//! Panic payloads and stack capture.
//!
//! By the time a `catch_unwind` sees a panic, the frames that raised it are
//! gone. [`install_hook`] adds a panic hook that records a backtrace at the
//! panic site into a thread-local; the catcher runs on the same thread during
//! the same poll and takes it with [`take_stack`].

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Once;

use bytes::Bytes;

thread_local! {
    static LAST_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Installs the stack-recording hook. Idempotent; the previously installed
/// hook still runs after it, so the default panic message is kept.
///
/// The hook is process-wide: once installed, every panic on every thread pays
/// for a forced backtrace. [`RequestLogging`](crate::middleware::RequestLogging),
/// [`LogRequests`](crate::middleware::LogRequests) and
/// [`Recoverer`](crate::middleware::Recoverer) call this for you.
pub fn install_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let stack = Backtrace::force_capture().to_string();
            LAST_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
            previous(info);
        }));
    });
}

/// The stack recorded for the most recent panic on this thread.
///
/// Falls back to a backtrace of the caller when the hook was not installed
/// (or another hook replaced it), so the result is never empty.
pub fn take_stack() -> Bytes {
    LAST_STACK
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
        .into()
}

/// Renders a panic payload. `panic!("...")` payloads are `&str` or `String`;
/// anything else is opaque.
pub fn describe(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}
