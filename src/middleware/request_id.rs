//! Correlation IDs minted upstream.
//!
//! nginx sets `proxy_set_header X-Request-ID $request_id;`, so every request
//! reaching the service already carries an ID. [`PropagateRequestId`] lifts it
//! into a [`RequestId`] extension; it does not invent one when the header is
//! missing. Responses are left alone unless [`echo`](PropagateRequestId::echo)
//! is turned on.

use http::HeaderName;
use http::header::HeaderValue;

use super::enrich::X_REQUEST_ID;
use super::{BoxFuture, Middleware, Next};
use crate::request::{Request, RequestId};

#[derive(Clone, Debug)]
pub struct PropagateRequestId {
    header: HeaderName,
    echo: bool,
}

impl PropagateRequestId {
    /// Reads `x-request-id`.
    pub fn new() -> Self {
        Self { header: X_REQUEST_ID, echo: false }
    }

    /// Reads a different header.
    pub fn header(mut self, name: HeaderName) -> Self {
        self.header = name;
        self
    }

    /// Also copies the ID onto the response under the same header. Off by
    /// default.
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

impl Default for PropagateRequestId {
    fn default() -> Self { Self::new() }
}

impl Middleware for PropagateRequestId {
    fn handle(&self, mut req: Request, next: Next) -> BoxFuture {
        let id = req
            .headers()
            .get(&self.header)
            .filter(|v| !v.is_empty())
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let Some(id) = id else {
            return next.run(req);
        };

        req.extensions_mut().insert(RequestId(id.clone()));
        if !self.echo {
            return next.run(req);
        }
        let header = self.header.clone();
        Box::pin(async move {
            let mut res = next.run(req).await;
            if let Ok(value) = HeaderValue::from_str(&id) {
                res.headers_mut().insert(header, value);
            }
            res
        })
    }
}
