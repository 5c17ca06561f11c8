//! Per-request logger installation and the one-record-per-request summary.
//!
//! ```text
//! request ─► derive logger (base + enrichers) ─► install ─► observe(next) ─► emit
//!                  │                                              │
//!                  └─ no base logger: run next, log nothing       └─ panic: emit panic record, resume unwinding
//! ```
//!
//! The summary record has message `request` and fields
//! `method`, `url`, `status`, `latency`, `bytes`, plus whatever the logger
//! already carries (`requestID` when an enricher found one). Severity is
//! [`Level::for_status`]. A panic instead produces one record at
//! [`Level::Panic`] with `panic` and `stack`, and the panic continues to
//! whoever recovers panics for the host.
//!
//! Pick one integration style per router: [`RequestLogging`] on its own, or
//! [`SetLogger`] together with [`RequestLogger`](super::RequestLogger) +
//! [`PanicSafeLogger`](super::PanicSafeLogger). Both at once log every request
//! twice.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use http::Method;

use super::enrich::Enricher;
use super::observer::{Metrics, observe};
use super::{BoxFuture, Middleware, Next};
use crate::context;
use crate::log::{Field, Level, Logger, Value};
use crate::panic;
use crate::request::Request;
use crate::response::Response;

/// Message tag of every record this module emits.
pub const REQUEST: &str = "request";

// ── Logger derivation ─────────────────────────────────────────────────────────

#[derive(Clone)]
enum Base {
    /// Bound at construction.
    Fixed(Logger),
    /// Whatever an outer middleware already installed.
    FromContext,
}

#[derive(Clone)]
struct Derive {
    base: Base,
    enrichers: Vec<Enricher>,
}

impl Derive {
    fn new(base: Base) -> Self {
        Self { base, enrichers: Vec::new() }
    }

    fn push(&mut self, f: impl Fn(Logger, &Request) -> Logger + Send + Sync + 'static) {
        self.enrichers.push(Arc::new(f));
    }

    /// `None` when there is no base logger: logging is off for this path.
    fn logger_for(&self, req: &Request) -> Option<Logger> {
        let base = match &self.base {
            Base::Fixed(logger) => logger.clone(),
            Base::FromContext => context::get(req)?.clone(),
        };
        Some(self.enrichers.iter().fold(base, |logger, enrich| enrich(logger, req)))
    }
}

// ── RequestLogging ────────────────────────────────────────────────────────────

/// Installs a per-request logger and logs one `request` record per request.
///
/// ```rust
/// use kiroku::Router;
/// use kiroku::log::{Logger, TracingSink};
/// use kiroku::middleware::{RequestLogging, enrich};
///
/// let app = Router::new().wrap(
///     RequestLogging::new(Logger::new(TracingSink))
///         .enrich(enrich::request_id())
///         .enrich(enrich::remote_addr()),
/// );
/// ```
#[derive(Clone)]
pub struct RequestLogging {
    derive: Derive,
}

impl RequestLogging {
    /// Every request starts from `logger`.
    ///
    /// Installs the process-wide stack-recording panic hook
    /// ([`panic::install_hook`]) the first time it runs. From then on every
    /// panic in the process, request or not, captures a backtrace.
    pub fn new(logger: Logger) -> Self {
        panic::install_hook();
        Self { derive: Derive::new(Base::Fixed(logger)) }
    }

    /// Every request starts from the logger an outer middleware installed.
    /// Requests without one are passed through unlogged.
    ///
    /// Installs the panic hook, like [`new`](Self::new).
    pub fn from_context() -> Self {
        panic::install_hook();
        Self { derive: Derive::new(Base::FromContext) }
    }

    /// Appends an enrichment function; they run in the order added.
    pub fn enrich(mut self, f: impl Fn(Logger, &Request) -> Logger + Send + Sync + 'static) -> Self {
        self.derive.push(f);
        self
    }
}

impl Middleware for RequestLogging {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let Some(logger) = self.derive.logger_for(&req) else {
            return next.run(req);
        };
        let req = context::set(req, logger.clone());
        Box::pin(log_request(logger, req, next))
    }
}

// ── SetLogger ─────────────────────────────────────────────────────────────────

/// Installs the per-request logger without logging anything itself.
///
/// Handlers read it with [`Request::logger`] or [`context::current`]; a
/// downstream [`LogRequests`] or a host [`RequestLogger`](super::RequestLogger)
/// does the summary.
#[derive(Clone)]
pub struct SetLogger {
    derive: Derive,
}

impl SetLogger {
    pub fn new(logger: Logger) -> Self {
        Self { derive: Derive::new(Base::Fixed(logger)) }
    }

    /// Re-derive from an outer logger, e.g. to add fields for one sub-tree.
    pub fn from_context() -> Self {
        Self { derive: Derive::new(Base::FromContext) }
    }

    pub fn enrich(mut self, f: impl Fn(Logger, &Request) -> Logger + Send + Sync + 'static) -> Self {
        self.derive.push(f);
        self
    }
}

impl Middleware for SetLogger {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        match self.derive.logger_for(&req) {
            Some(logger) => {
                let req = context::set(req, logger.clone());
                Box::pin(context::scope(logger, next.run(req)))
            }
            None => next.run(req),
        }
    }
}

// ── LogRequests ───────────────────────────────────────────────────────────────

/// Logs the `request` record with the logger already installed on the
/// request. Without one it does nothing but call the next handler.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogRequests;

impl Middleware for LogRequests {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        match context::get(&req).cloned() {
            Some(logger) => Box::pin(log_request(logger, req, next)),
            None => next.run(req),
        }
    }
}

// ── Emission ──────────────────────────────────────────────────────────────────

async fn log_request(logger: Logger, req: Request, next: Next) -> Response {
    panic::install_hook();

    let method = req.method().clone();
    let url = req.url();

    let outcome = AssertUnwindSafe(context::scope(logger.clone(), observe(next, req)))
        .catch_unwind()
        .await;

    match outcome {
        Ok((response, metrics)) => {
            emit_completion(&logger, &method, &url, &metrics);
            response
        }
        Err(payload) => {
            // Same thread, same poll as the panic: the hook's stack is ours.
            emit_panic(&logger, &panic::describe(payload.as_ref()), panic::take_stack());
            std::panic::resume_unwind(payload)
        }
    }
}

/// `status`, `latency`, `bytes`.
pub(crate) fn outcome_fields(metrics: &Metrics) -> [Field; 3] {
    [
        Field { key: "status", value: metrics.status.into() },
        Field { key: "latency", value: metrics.elapsed.into() },
        Field { key: "bytes", value: metrics.bytes.into() },
    ]
}

fn emit_completion(logger: &Logger, method: &Method, url: &str, metrics: &Metrics) {
    let request = [
        Field { key: "method", value: method.as_str().into() },
        Field { key: "url", value: url.into() },
    ];
    logger.log(
        Level::for_status(metrics.status),
        REQUEST,
        request.into_iter().chain(outcome_fields(metrics)),
    );
}

pub(crate) fn emit_panic(logger: &Logger, value: &str, stack: bytes::Bytes) {
    logger.log(
        Level::Panic,
        REQUEST,
        [
            Field { key: "panic", value: value.into() },
            Field { key: "stack", value: Value::Bytes(stack) },
        ],
    );
}
