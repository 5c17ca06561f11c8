//! Host-side request-log and panic-recovery hooks.
//!
//! The host owns two decisions: what a request log entry is
//! ([`LogFormatter`]), and what a panicking handler turns into
//! ([`Recoverer`]: `500 Internal Server Error`). Each request's entry hears
//! about exactly one outcome: [`LogEntry::write`] when a response came back,
//! or [`LogEntry::panic`] when the handler panicked and was recovered.
//!
//! Order matters — the entry must exist before the panic is caught:
//!
//! ```rust
//! use kiroku::Router;
//! use kiroku::log::{Logger, TracingSink};
//! use kiroku::middleware::{enrich, PanicSafeLogger, Recoverer, RequestLogger, SetLogger};
//!
//! let app = Router::new()
//!     .wrap(SetLogger::new(Logger::new(TracingSink)).enrich(enrich::request_id()))
//!     .wrap(RequestLogger::new(PanicSafeLogger))
//!     .wrap(Recoverer);
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use http::{HeaderMap, StatusCode};

use super::observer::observe;
use super::{BoxFuture, Middleware, Next};
use crate::panic;
use crate::request::Request;
use crate::response::Response;

/// A finished, non-panicking request as the host saw it.
#[derive(Debug)]
pub struct Completion<'a> {
    pub status: StatusCode,
    pub bytes: u64,
    pub headers: &'a HeaderMap,
    pub elapsed: Duration,
}

/// Receives the outcome of one request.
pub trait LogEntry: Send + Sync + 'static {
    fn write(&self, completion: &Completion<'_>);

    /// `stack` is the raw backtrace text captured at the panic site.
    fn panic(&self, value: &(dyn Any + Send), stack: &[u8]);
}

/// Creates the [`LogEntry`] for each request.
pub trait LogFormatter: Send + Sync + 'static {
    fn new_log_entry(&self, req: &Request) -> Arc<dyn LogEntry>;
}

/// The entry travelling with the request, plus whether it already heard
/// about a panic.
#[derive(Clone)]
struct Slot {
    entry: Arc<dyn LogEntry>,
    panicked: Arc<AtomicBool>,
}

impl Slot {
    fn fire_panic(&self, value: &(dyn Any + Send), stack: &[u8]) {
        if !self.panicked.swap(true, Ordering::AcqRel) {
            self.entry.panic(value, stack);
        }
    }
}

/// The log entry [`RequestLogger`] created for `req`.
pub fn log_entry(req: &Request) -> Option<Arc<dyn LogEntry>> {
    req.extensions().get::<Slot>().map(|slot| Arc::clone(&slot.entry))
}

// ── RequestLogger ─────────────────────────────────────────────────────────────

/// Creates a log entry per request and reports the completed response to it.
pub struct RequestLogger<F> {
    formatter: Arc<F>,
}

impl<F: LogFormatter> RequestLogger<F> {
    pub fn new(formatter: F) -> Self {
        Self { formatter: Arc::new(formatter) }
    }
}

impl<F: LogFormatter> Middleware for RequestLogger<F> {
    fn handle(&self, mut req: Request, next: Next) -> BoxFuture {
        let slot = Slot {
            entry: self.formatter.new_log_entry(&req),
            panicked: Arc::default(),
        };
        req.extensions_mut().insert(slot.clone());

        Box::pin(async move {
            let (response, metrics) = observe(next, req).await;
            // A recovered panic already reached the entry; one outcome per request.
            if !slot.panicked.load(Ordering::Acquire) {
                slot.entry.write(&Completion {
                    status: metrics.status,
                    bytes: metrics.bytes,
                    headers: response.headers(),
                    elapsed: metrics.elapsed,
                });
            }
            response
        })
    }
}

// ── Recoverer ─────────────────────────────────────────────────────────────────

/// Catches a handler panic, reports it to the request's log entry and
/// answers `500 Internal Server Error`.
///
/// Without a [`RequestLogger`] outside it, the panic is reported through
/// `tracing` instead.
#[derive(Clone, Copy, Debug, Default)]
pub struct Recoverer;

impl Middleware for Recoverer {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        panic::install_hook();
        let slot = req.extensions().get::<Slot>().cloned();

        Box::pin(async move {
            match AssertUnwindSafe(next.run(req)).catch_unwind().await {
                Ok(response) => response,
                Err(payload) => {
                    let stack = panic::take_stack();
                    match slot {
                        Some(slot) => slot.fire_panic(payload.as_ref(), &stack),
                        None => tracing::error!(
                            panic = %panic::describe(payload.as_ref()),
                            "handler panicked with no log entry attached"
                        ),
                    }
                    Response::status(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        })
    }
}
