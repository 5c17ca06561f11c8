//! Response observation: status, size and latency of what the chain produced.
//!
//! The server writes a response once, after the whole chain has returned, so
//! observing it means holding the returned [`Response`] up to the light and
//! passing it on unchanged. Nothing here touches headers or body.

use std::time::{Duration, Instant};

use http::StatusCode;

use super::Next;
use crate::request::Request;
use crate::response::Response;

/// What one request produced.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Metrics {
    /// `200 OK` unless the handler chose another status.
    pub status: StatusCode,
    /// Body bytes written to the client.
    pub bytes: u64,
    /// Time from entering the downstream chain until it returned.
    pub elapsed: Duration,
}

impl Metrics {
    pub fn of(response: &Response, elapsed: Duration) -> Self {
        Self { status: response.status_code(), bytes: response.body_len(), elapsed }
    }
}

/// Runs `next` and measures the response it returns.
///
/// A panic in the chain passes straight through; timing for that case belongs
/// to whoever catches it.
pub async fn observe(next: Next, req: Request) -> (Response, Metrics) {
    let started = Instant::now();
    let response = next.run(req).await;
    let metrics = Metrics::of(&response, started.elapsed());
    (response, metrics)
}
