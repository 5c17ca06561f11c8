//! Enrichment functions: `Fn(Logger, &Request) -> Logger`.
//!
//! [`RequestLogging`](super::RequestLogging) and [`SetLogger`](super::SetLogger)
//! apply them left to right; a later one may overwrite a field an earlier one
//! set. Each returns the logger unchanged when it has nothing to add, so a
//! missing value is an absent field, never an empty one.

use std::sync::Arc;

use http::HeaderName;
use http::header::HeaderValue;

use crate::log::{Logger, Value};
use crate::request::Request;

/// A configured enrichment function.
pub type Enricher = Arc<dyn Fn(Logger, &Request) -> Logger + Send + Sync>;

/// Header reverse proxies conventionally put the correlation ID in.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// `requestID` from the host's [`RequestId`](crate::RequestId), falling back
/// to the `x-request-id` header.
pub fn request_id() -> impl Fn(Logger, &Request) -> Logger + Send + Sync + 'static {
    |logger: Logger, req: &Request| {
        let id = req.request_id().or_else(|| header_str(req, &X_REQUEST_ID));
        match id {
            Some(id) => logger.with("requestID", id),
            None => logger,
        }
    }
}

/// `requestID` from a specific header.
pub fn request_id_header(name: HeaderName) -> impl Fn(Logger, &Request) -> Logger + Send + Sync + 'static {
    move |logger: Logger, req: &Request| match header_str(req, &name) {
        Some(id) => logger.with("requestID", id),
        None => logger,
    }
}

/// `remoteAddr` — the peer the connection came from (usually the proxy).
pub fn remote_addr() -> impl Fn(Logger, &Request) -> Logger + Send + Sync + 'static {
    |logger: Logger, req: &Request| match req.remote_addr() {
        Some(addr) => logger.with("remoteAddr", addr.to_string()),
        None => logger,
    }
}

/// `method` and `url`, so every record written while serving the request
/// carries them, not just the final `request` record.
pub fn method_and_url() -> impl Fn(Logger, &Request) -> Logger + Send + Sync + 'static {
    |logger: Logger, req: &Request| {
        logger.with("method", req.method().as_str()).with("url", req.url())
    }
}

/// A constant field, e.g. `field("service", "billing")`.
pub fn field(key: &'static str, value: impl Into<Value>) -> impl Fn(Logger, &Request) -> Logger + Send + Sync + 'static {
    let value = value.into();
    move |logger: Logger, _req: &Request| logger.with(key, value.clone())
}

fn header_str<'r>(req: &'r Request, name: &HeaderName) -> Option<&'r str> {
    req.headers()
        .get(name)
        .and_then(|v: &HeaderValue| v.to_str().ok())
        .filter(|v| !v.is_empty())
}
