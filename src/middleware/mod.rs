//! Middleware layer.
//!
//! A middleware receives the request and a [`Next`] handle to the rest of the
//! chain. It may look at the request, replace it, call `next.run(req)` and
//! look at the response on the way out.
//!
//! ```text
//! Router::wrap(a).wrap(b)
//!
//! request ─► a ─► b ─► handler
//! response ◄─ a ◄─ b ◄─┘
//! ```
//!
//! Built-in middleware:
//!
//! | Middleware | Module | Job |
//! |---|---|---|
//! | [`RequestLogging`] | [`request_log`] | install a per-request logger and log one `request` record |
//! | [`SetLogger`] | [`request_log`] | install only |
//! | [`LogRequests`] | [`request_log`] | log only, with the already installed logger |
//! | [`RequestLogger`] | [`recover`] | host hook: drive a [`LogFormatter`] entry per request |
//! | [`Recoverer`] | [`recover`] | host hook: turn a handler panic into `500` |
//! | [`PropagateRequestId`] | [`request_id`] | carry the proxy's `x-request-id` |
//!
//! Plain async functions are middleware too:
//!
//! ```rust
//! use kiroku::{Request, Response};
//! use kiroku::middleware::Next;
//!
//! async fn server_header(req: Request, next: Next) -> Response {
//!     let mut res = next.run(req).await;
//!     res.headers_mut().insert("server", http::HeaderValue::from_static("kiroku"));
//!     res
//! }
//! ```

pub mod enrich;
pub mod log_entry;
pub mod observer;
pub mod recover;
pub mod request_id;
pub mod request_log;

use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::IntoResponse;

pub use crate::handler::BoxFuture;
pub use log_entry::PanicSafeLogger;
pub use observer::{Metrics, observe};
pub use recover::{Completion, LogEntry, LogFormatter, Recoverer, RequestLogger};
pub use request_id::PropagateRequestId;
pub use request_log::{LogRequests, RequestLogging, SetLogger};

/// A request-processing step wrapped around the rest of the chain.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

impl<F, Fut, R> Middleware for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        let fut = self(req, next);
        Box::pin(async move { fut.await.into_response() })
    }
}

pub(crate) type Chain = Arc<Vec<Arc<dyn Middleware>>>;

/// The remainder of a middleware chain, ending in the route handler.
///
/// Consumed by [`run`](Next::run), so the downstream chain executes at most
/// once per request.
pub struct Next {
    endpoint: BoxedHandler,
    chain: Chain,
    position: usize,
}

impl Next {
    /// A chain with no middleware in front of `handler`.
    pub fn new(handler: impl Handler) -> Self {
        Self::with_chain(handler.into_boxed_handler(), Arc::default())
    }

    pub(crate) fn with_chain(endpoint: BoxedHandler, chain: Chain) -> Self {
        Self { endpoint, chain, position: 0 }
    }

    /// Puts `middleware` in front of the remaining chain.
    pub fn wrap(self, middleware: impl Middleware) -> Self {
        let mut chain = self.chain[self.position..].to_vec();
        chain.insert(0, Arc::new(middleware));
        Self { endpoint: self.endpoint, chain: Arc::new(chain), position: 0 }
    }

    /// Runs the next middleware, or the handler once the chain is exhausted.
    pub fn run(mut self, req: Request) -> BoxFuture {
        match self.chain.get(self.position).cloned() {
            Some(middleware) => {
                self.position += 1;
                middleware.handle(req, self)
            }
            None => self.endpoint.call(req),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::response::Response;

    async fn hello(_req: Request) -> Response {
        Response::text("hello")
    }

    async fn tag(req: Request, next: Next) -> Response {
        let mut res = next.run(req).await;
        let seen = res.headers().get_all("x-order").iter().count();
        res.headers_mut().append("x-order", http::HeaderValue::from(seen));
        res
    }

    fn request() -> Request {
        Request::from_http(http::Request::get("/").body(Bytes::new()).unwrap())
    }

    #[tokio::test]
    async fn bare_next_runs_handler() {
        let res = Next::new(hello).run(request()).await;
        assert_eq!(res.body().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn wrapped_middleware_runs_outermost_last_on_the_way_out() {
        let res = Next::new(hello).wrap(tag).wrap(tag).run(request()).await;
        let order: Vec<_> = res.headers().get_all("x-order").iter().collect();
        assert_eq!(order, ["0", "1"]);
        assert_eq!(res.body().as_ref(), b"hello");
    }
}
