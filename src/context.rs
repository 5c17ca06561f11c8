//! Per-request logger storage.
//!
//! Two views of the same thing:
//!
//! - **Request-scoped** — [`set`] / [`get`] keep the logger in the request's
//!   extensions under a private key, so only code holding that request sees it.
//! - **Task-scoped** — [`scope`] / [`current`] keep it in a tokio task-local
//!   for the duration of one future, so code that never sees the `Request`
//!   (a repository, a client wrapper) can still log with the request's fields.
//!
//! Neither is shared between requests: every request owns its extensions, and
//! a task-local scope covers exactly the future it wraps.

use std::future::Future;

use crate::log::Logger;
use crate::request::Request;

/// Private extension key; nothing outside this module can read or overwrite it.
#[derive(Clone)]
struct Installed(Logger);

tokio::task_local! {
    static CURRENT: Logger;
}

/// Returns `req` carrying `logger`.
///
/// Takes the request by value: the caller hands over the old context and gets
/// the derived one back, so there is no window in which two owners disagree.
pub fn set(mut req: Request, logger: Logger) -> Request {
    req.extensions_mut().insert(Installed(logger));
    req
}

/// The logger installed on `req`. `None` means logging is disabled on this
/// path, not that something went wrong.
pub fn get(req: &Request) -> Option<&Logger> {
    req.extensions().get::<Installed>().map(|installed| &installed.0)
}

/// Runs `fut` with `logger` as the task's current logger.
pub async fn scope<F: Future>(logger: Logger, fut: F) -> F::Output {
    CURRENT.scope(logger, fut).await
}

/// The logger of the request the calling task is serving, if any.
pub fn current() -> Option<Logger> {
    CURRENT.try_with(Logger::clone).ok()
}
